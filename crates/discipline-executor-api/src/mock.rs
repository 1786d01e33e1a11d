//! Mock executor for testing
//!
//! Simulates a device package manager: installed packages with an enabled
//! flag, a set of profiles, a home launcher, readiness, and targeted
//! failures. Every `set_enabled` call is recorded.

use async_trait::async_trait;
use discipline_util::{PackageName, ProfileId};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{CommandOutput, ExecutorError, ExecutorResult, InstalledPackage, PrivilegedExecutor};

/// One recorded `set_enabled` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEnabledCall {
    pub package: PackageName,
    pub profile: ProfileId,
    pub enabled: bool,
    pub succeeded: bool,
}

/// Mock executor for unit/integration testing
pub struct MockExecutor {
    ready: Mutex<bool>,
    profiles: Mutex<Vec<ProfileId>>,
    packages: Mutex<BTreeMap<PackageName, bool>>,
    launcher: Mutex<Option<PackageName>>,
    calls: Mutex<Vec<SetEnabledCall>>,
    commands: Mutex<Vec<String>>,
    /// Added to every readiness check, to simulate a slow device
    latency: Mutex<Option<Duration>>,

    fail_profiles: Mutex<bool>,
    fail_launcher: Mutex<bool>,
    fail_queries: Mutex<HashSet<PackageName>>,
    fail_apply_on: Mutex<HashSet<ProfileId>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockExecutor {
    /// A ready device with only the primary profile and nothing installed
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(true),
            profiles: Mutex::new(vec![ProfileId::PRIMARY]),
            packages: Mutex::new(BTreeMap::new()),
            launcher: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
            fail_profiles: Mutex::new(false),
            fail_launcher: Mutex::new(false),
            fail_queries: Mutex::new(HashSet::new()),
            fail_apply_on: Mutex::new(HashSet::new()),
        }
    }

    /// Install packages, all enabled
    pub fn with_packages<I, P>(self, packages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PackageName>,
    {
        {
            let mut installed = lock(&self.packages);
            for p in packages {
                installed.insert(p.into(), true);
            }
        }
        self
    }

    pub fn with_profiles(self, profiles: Vec<ProfileId>) -> Self {
        *lock(&self.profiles) = profiles;
        self
    }

    pub fn with_launcher(self, launcher: impl Into<PackageName>) -> Self {
        *lock(&self.launcher) = Some(launcher.into());
        self
    }

    pub fn set_ready(&self, ready: bool) {
        *lock(&self.ready) = ready;
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Force the enabled flag of a package (installing it if needed)
    pub fn set_package_enabled(&self, package: impl Into<PackageName>, enabled: bool) {
        lock(&self.packages).insert(package.into(), enabled);
    }

    /// Current enabled flag; packages that are not installed count as enabled
    pub fn is_enabled(&self, package: &PackageName) -> bool {
        lock(&self.packages).get(package).copied().unwrap_or(true)
    }

    pub fn disabled_packages(&self) -> Vec<PackageName> {
        lock(&self.packages)
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn fail_profile_enumeration(&self, fail: bool) {
        *lock(&self.fail_profiles) = fail;
    }

    pub fn fail_launcher_resolution(&self, fail: bool) {
        *lock(&self.fail_launcher) = fail;
    }

    pub fn fail_query_for(&self, package: impl Into<PackageName>) {
        lock(&self.fail_queries).insert(package.into());
    }

    /// Make every `set_enabled` on this profile fail
    pub fn fail_apply_on(&self, profile: ProfileId) {
        lock(&self.fail_apply_on).insert(profile);
    }

    pub fn clear_failures(&self) {
        *lock(&self.fail_profiles) = false;
        *lock(&self.fail_launcher) = false;
        lock(&self.fail_queries).clear();
        lock(&self.fail_apply_on).clear();
    }

    /// Every `set_enabled` call so far
    pub fn calls(&self) -> Vec<SetEnabledCall> {
        lock(&self.calls).clone()
    }

    /// Raw commands passed to `run_command`
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrivilegedExecutor for MockExecutor {
    async fn ready(&self) -> bool {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        *lock(&self.ready)
    }

    async fn run_command(&self, command: &str) -> ExecutorResult<CommandOutput> {
        lock(&self.commands).push(command.to_string());
        if !*lock(&self.ready) {
            return Err(ExecutorError::NotReady("mock not ready".into()));
        }
        Ok(CommandOutput::new(0, ""))
    }

    async fn enumerate_profiles(&self) -> ExecutorResult<Vec<ProfileId>> {
        if *lock(&self.fail_profiles) {
            return Err(ExecutorError::Internal("mock profile enumeration failure".into()));
        }
        Ok(lock(&self.profiles).clone())
    }

    async fn query_enabled(&self, package: &PackageName) -> ExecutorResult<bool> {
        if lock(&self.fail_queries).contains(package) {
            return Err(ExecutorError::CommandFailed {
                exit_code: 1,
                output: "mock query failure".into(),
            });
        }
        Ok(self.is_enabled(package))
    }

    async fn set_enabled(
        &self,
        package: &PackageName,
        profile: ProfileId,
        enabled: bool,
    ) -> ExecutorResult<()> {
        let succeeded = !lock(&self.fail_apply_on).contains(&profile);
        lock(&self.calls).push(SetEnabledCall {
            package: package.clone(),
            profile,
            enabled,
            succeeded,
        });

        if !succeeded {
            return Err(ExecutorError::CommandFailed {
                exit_code: 1,
                output: format!("mock apply failure on profile {}", profile),
            });
        }

        lock(&self.packages).insert(package.clone(), enabled);
        Ok(())
    }

    async fn list_packages(&self) -> ExecutorResult<Vec<InstalledPackage>> {
        Ok(lock(&self.packages)
            .iter()
            .map(|(package, enabled)| InstalledPackage {
                package: package.clone(),
                enabled: *enabled,
            })
            .collect())
    }

    async fn home_launcher(&self) -> ExecutorResult<Option<PackageName>> {
        if *lock(&self.fail_launcher) {
            return Err(ExecutorError::Internal("mock launcher failure".into()));
        }
        Ok(lock(&self.launcher).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_toggles_and_records() {
        let exec = MockExecutor::new().with_packages(["com.example.game"]);
        let pkg = PackageName::new("com.example.game");

        assert!(exec.query_enabled(&pkg).await.unwrap());
        exec.set_enabled(&pkg, ProfileId::PRIMARY, false).await.unwrap();
        assert!(!exec.query_enabled(&pkg).await.unwrap());
        assert_eq!(exec.disabled_packages(), vec![pkg.clone()]);

        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].enabled);
        assert!(calls[0].succeeded);
    }

    #[tokio::test]
    async fn mock_failures() {
        let exec = MockExecutor::new().with_profiles(vec![ProfileId::new(0), ProfileId::new(10)]);
        let pkg = PackageName::new("a.b");

        exec.fail_apply_on(ProfileId::new(10));
        assert!(exec.set_enabled(&pkg, ProfileId::new(0), false).await.is_ok());
        assert!(exec.set_enabled(&pkg, ProfileId::new(10), false).await.is_err());
        assert!(!exec.calls()[1].succeeded);

        exec.fail_query_for("a.b");
        assert!(exec.query_enabled(&pkg).await.is_err());

        exec.fail_profile_enumeration(true);
        assert!(exec.enumerate_profiles().await.is_err());

        exec.clear_failures();
        assert_eq!(exec.enumerate_profiles().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn not_ready_rejects_commands() {
        let exec = MockExecutor::new();
        exec.set_ready(false);
        assert!(!exec.ready().await);
        assert!(exec.run_command("id").await.is_err());
        assert_eq!(exec.commands(), vec!["id".to_string()]);
    }
}
