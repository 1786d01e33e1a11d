//! Privileged executor trait

use async_trait::async_trait;
use discipline_util::{PackageName, ProfileId};
use std::time::Duration;
use thiserror::Error;

use crate::commands::{
    parse_package_list, parse_profiles, parse_resolved_activity, query_disabled_command,
    set_enabled_command, LIST_DISABLED, LIST_THIRD_PARTY, LIST_USERS, RESOLVE_HOME,
};

/// Errors from privileged operations
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor not ready: {0}")]
    NotReady(String),

    #[error("Command failed with exit code {exit_code}: {output}")]
    CommandFailed { exit_code: i32, output: String },

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Refused to disable protected package {0}")]
    Protected(PackageName),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Result of one privileged shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Combined, trimmed output
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// `pm` sometimes exits 0 while printing an error, so both are checked
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.output.to_ascii_lowercase().contains("error")
    }

    fn into_result(self) -> ExecutorResult<String> {
        if self.exit_code == 0 {
            Ok(self.output)
        } else {
            Err(ExecutorError::CommandFailed {
                exit_code: self.exit_code,
                output: self.output,
            })
        }
    }
}

/// An installed package and whether it is currently enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub package: PackageName,
    pub enabled: bool,
}

/// Elevated command channel.
///
/// Implementors provide `ready` and `run_command`; the package-manager
/// operations have default implementations on top of `run_command` that
/// an implementation may override.
#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    /// Whether privileged commands can be run right now
    async fn ready(&self) -> bool;

    /// Run a shell command with elevated rights
    async fn run_command(&self, command: &str) -> ExecutorResult<CommandOutput>;

    /// Device user profiles (primary user, work profile, clones).
    ///
    /// An empty parse is reported as an error so the caller can decide
    /// on a fallback.
    async fn enumerate_profiles(&self) -> ExecutorResult<Vec<ProfileId>> {
        let output = self.run_command(LIST_USERS).await?.into_result()?;
        let profiles = parse_profiles(&output);
        if profiles.is_empty() {
            return Err(ExecutorError::Internal(format!(
                "no profiles in output: {}",
                output
            )));
        }
        Ok(profiles)
    }

    /// Whether a package is enabled. Packages that are not installed
    /// report as enabled.
    async fn query_enabled(&self, package: &PackageName) -> ExecutorResult<bool> {
        let output = self
            .run_command(&query_disabled_command(package))
            .await?
            .into_result()?;
        let disabled = parse_package_list(&output).iter().any(|p| p == package);
        Ok(!disabled)
    }

    /// Enable or disable a package for one profile
    async fn set_enabled(
        &self,
        package: &PackageName,
        profile: ProfileId,
        enabled: bool,
    ) -> ExecutorResult<()> {
        let result = self
            .run_command(&set_enabled_command(package, profile, enabled))
            .await?;
        if result.succeeded() {
            Ok(())
        } else {
            Err(ExecutorError::CommandFailed {
                exit_code: result.exit_code,
                output: result.output,
            })
        }
    }

    /// Installed third-party packages with their enabled state
    async fn list_packages(&self) -> ExecutorResult<Vec<InstalledPackage>> {
        let installed = self.run_command(LIST_THIRD_PARTY).await?.into_result()?;
        let disabled = self.run_command(LIST_DISABLED).await?.into_result()?;
        let disabled = parse_package_list(&disabled);

        let mut packages: Vec<InstalledPackage> = parse_package_list(&installed)
            .into_iter()
            .map(|package| InstalledPackage {
                enabled: !disabled.contains(&package),
                package,
            })
            .collect();
        packages.sort_by(|a, b| a.package.cmp(&b.package));
        Ok(packages)
    }

    /// Package currently acting as the default home screen, if any
    async fn home_launcher(&self) -> ExecutorResult<Option<PackageName>> {
        let output = self.run_command(RESOLVE_HOME).await?.into_result()?;
        Ok(parse_resolved_activity(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers commands from a fixed table and records what was run
    struct Scripted {
        answers: HashMap<String, CommandOutput>,
        ran: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[(&str, i32, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(cmd, code, out)| (cmd.to_string(), CommandOutput::new(*code, *out)))
                    .collect(),
                ran: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PrivilegedExecutor for Scripted {
        async fn ready(&self) -> bool {
            true
        }

        async fn run_command(&self, command: &str) -> ExecutorResult<CommandOutput> {
            self.ran.lock().unwrap().push(command.to_string());
            self.answers
                .get(command)
                .cloned()
                .ok_or_else(|| ExecutorError::Internal(format!("unexpected command {}", command)))
        }
    }

    #[test]
    fn success_requires_clean_output() {
        assert!(CommandOutput::new(0, "Package com.a new state: disabled-user").succeeded());
        assert!(!CommandOutput::new(0, "Error: unknown package").succeeded());
        assert!(!CommandOutput::new(1, "").succeeded());
    }

    #[tokio::test]
    async fn profiles_parsed_from_user_list() {
        let exec = Scripted::new(&[(
            "pm list users",
            0,
            "Users:\n\tUserInfo{0:Owner:13} running\n\tUserInfo{10:Work:30}",
        )]);
        let profiles = exec.enumerate_profiles().await.unwrap();
        assert_eq!(profiles, vec![ProfileId::new(0), ProfileId::new(10)]);
    }

    #[tokio::test]
    async fn profile_enumeration_errors() {
        let exec = Scripted::new(&[("pm list users", 255, "denied")]);
        assert!(exec.enumerate_profiles().await.is_err());

        let exec = Scripted::new(&[("pm list users", 0, "Users:")]);
        assert!(exec.enumerate_profiles().await.is_err());
    }

    #[tokio::test]
    async fn query_matches_exact_name() {
        let exec = Scripted::new(&[
            (
                "pm list packages -d com.example.game",
                0,
                "package:com.example.game.pro",
            ),
            (
                "pm list packages -d com.example.video",
                0,
                "package:com.example.video",
            ),
        ]);

        // Only a longer name matched the filter, so the package is enabled
        assert!(exec.query_enabled(&"com.example.game".into()).await.unwrap());
        assert!(!exec.query_enabled(&"com.example.video".into()).await.unwrap());
        assert!(exec.query_enabled(&"com.example.other".into()).await.is_err());
    }

    #[tokio::test]
    async fn set_enabled_checks_output() {
        let exec = Scripted::new(&[
            (
                "pm disable-user --user 0 com.example.game",
                0,
                "Package com.example.game new state: disabled-user",
            ),
            (
                "pm enable --user 10 com.example.game",
                0,
                "Error: java.lang.SecurityException",
            ),
        ]);

        let pkg = PackageName::new("com.example.game");
        assert!(exec.set_enabled(&pkg, ProfileId::PRIMARY, false).await.is_ok());
        assert!(matches!(
            exec.set_enabled(&pkg, ProfileId::new(10), true).await,
            Err(ExecutorError::CommandFailed { exit_code: 0, .. })
        ));
    }

    #[tokio::test]
    async fn list_packages_marks_disabled() {
        let exec = Scripted::new(&[
            ("pm list packages -3", 0, "package:b.video\npackage:a.game"),
            ("pm list packages -d", 0, "package:a.game\npackage:com.android.system"),
        ]);

        let packages = exec.list_packages().await.unwrap();
        assert_eq!(
            packages,
            vec![
                InstalledPackage {
                    package: "a.game".into(),
                    enabled: false
                },
                InstalledPackage {
                    package: "b.video".into(),
                    enabled: true
                },
            ]
        );
        assert_eq!(exec.ran.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn home_launcher_resolution() {
        let exec = Scripted::new(&[(RESOLVE_HOME, 0, "priority=0\ncom.example.home/.Home")]);
        assert_eq!(
            exec.home_launcher().await.unwrap(),
            Some(PackageName::new("com.example.home"))
        );
    }
}
