//! The reconciler
//!
//! One run: check readiness, load a fresh snapshot of policies, groups and
//! management memory, compute the plan, inspect every package in scope,
//! correct the ones whose state differs, then replace the memory with this
//! run's declared scope. Runs never retry; whatever fails is left for the
//! next run.

use chrono::{DateTime, Local};
use discipline_api::{RunStatus, RunSummary};
use discipline_executor_api::{ExecutorError, PrivilegedExecutor};
use discipline_store::{AuditEvent, AuditEventType, Store, StoreError};
use discipline_util::{PackageName, ProfileId};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::scope::{ReconcilePlan, SafetyExclusions};
use crate::state::PolicySet;

/// Why a run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExecutorNotReady,
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every package in scope is at its target
    Applied,
    /// Nothing was read, written or issued
    Skipped(SkipReason),
    /// Some corrections failed, or state could not be loaded
    Failed { reason: String },
}

/// A correction that did not succeed on any profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub package: PackageName,
    pub target_enabled: bool,
    pub reason: String,
}

/// What a run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub inspected: usize,
    pub desired_restricted: BTreeSet<PackageName>,
    pub enabled: Vec<PackageName>,
    pub disabled: Vec<PackageName>,
    pub failures: Vec<ApplyFailure>,
}

impl RunReport {
    fn empty(outcome: RunOutcome, started_at: DateTime<Local>) -> Self {
        Self {
            outcome,
            started_at,
            finished_at: discipline_util::now(),
            inspected: 0,
            desired_restricted: BTreeSet::new(),
            enabled: Vec::new(),
            disabled: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn changed(&self) -> usize {
        self.enabled.len() + self.disabled.len()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Skipped(_))
    }

    pub fn to_summary(&self) -> RunSummary {
        let (status, message) = match &self.outcome {
            RunOutcome::Applied => (RunStatus::Applied, None),
            RunOutcome::Skipped(SkipReason::ExecutorNotReady) => (
                RunStatus::Skipped,
                Some("privileged executor not ready".to_string()),
            ),
            RunOutcome::Failed { reason } => (RunStatus::Failed, Some(reason.clone())),
        };

        RunSummary {
            status,
            finished_at: self.finished_at,
            inspected: self.inspected,
            desired_restricted: self.desired_restricted.len(),
            enabled: self.enabled.clone(),
            disabled: self.disabled.clone(),
            failed: self.failures.iter().map(|f| f.package.clone()).collect(),
            message,
        }
    }
}

/// Diffs desired against actual package state and corrects it
pub struct Reconciler {
    store: Arc<dyn Store>,
    executor: Arc<dyn PrivilegedExecutor>,
    protected: Vec<PackageName>,
    /// Last launcher that resolved, kept protected while lookups fail
    last_launcher: Mutex<Option<PackageName>>,
}

impl Reconciler {
    /// `protected` is the static part of the exclusion set; the home
    /// launcher is added on every run
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<dyn PrivilegedExecutor>,
        protected: Vec<PackageName>,
    ) -> Self {
        Self {
            store,
            executor,
            protected,
            last_launcher: Mutex::new(None),
        }
    }

    pub fn executor(&self) -> &Arc<dyn PrivilegedExecutor> {
        &self.executor
    }

    /// Static exclusions plus the home launcher. When the lookup fails the
    /// last launcher seen stays protected.
    pub async fn exclusions(&self) -> SafetyExclusions {
        let resolved = match self.executor.home_launcher().await {
            Ok(launcher) => launcher,
            Err(e) => {
                warn!(error = %e, "Could not resolve home launcher");
                None
            }
        };

        let mut last = self
            .last_launcher
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let launcher = match resolved {
            Some(launcher) => {
                *last = Some(launcher.clone());
                Some(launcher)
            }
            None => {
                if let Some(previous) = last.as_ref() {
                    debug!(launcher = %previous, "Keeping previously resolved launcher protected");
                }
                last.clone()
            }
        };
        drop(last);

        SafetyExclusions::new(self.protected.iter().cloned()).with_launcher(launcher)
    }

    /// Run once. Never fails; problems are reported in the outcome.
    pub async fn run(&self, now: DateTime<Local>) -> RunReport {
        let started_at = discipline_util::now();

        if !self.executor.ready().await {
            info!("Privileged executor not ready, skipping run");
            return RunReport::empty(RunOutcome::Skipped(SkipReason::ExecutorNotReady), started_at);
        }

        match self.reconcile(now, started_at).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Reconciliation aborted");
                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::ReconcileFailed {
                    message: e.to_string(),
                }));
                RunReport::empty(
                    RunOutcome::Failed {
                        reason: e.to_string(),
                    },
                    started_at,
                )
            }
        }
    }

    /// Packages the current policies want disabled, without touching them
    pub async fn preview(&self, now: DateTime<Local>) -> Result<BTreeSet<PackageName>, StoreError> {
        let set = PolicySet::load(self.store.as_ref())?;
        let exclusions = self.exclusions().await;
        let plan = ReconcilePlan::compute(&set, &BTreeSet::new(), &exclusions, &now);
        Ok(plan.desired_restricted)
    }

    async fn reconcile(
        &self,
        now: DateTime<Local>,
        started_at: DateTime<Local>,
    ) -> Result<RunReport, StoreError> {
        let set = PolicySet::load(self.store.as_ref())?;
        let memory = self.load_memory()?;
        let exclusions = self.exclusions().await;
        let plan = ReconcilePlan::compute(&set, &memory, &exclusions, &now);

        info!(
            policies = set.policies.len(),
            scope = plan.current_scope.len(),
            remembered = memory.len(),
            desired = plan.desired_restricted.len(),
            "Reconciling"
        );

        let mut report = RunReport::empty(RunOutcome::Applied, started_at);
        report.inspected = plan.current_scope.len();
        let mut profiles: Option<Vec<ProfileId>> = None;

        for package in &plan.current_scope {
            let actual = match self.executor.query_enabled(package).await {
                Ok(enabled) => enabled,
                Err(e) => {
                    warn!(package = %package, error = %e, "State query failed, assuming enabled");
                    true
                }
            };
            let target = plan.target_enabled(package);
            if actual == target {
                continue;
            }

            if profiles.is_none() {
                profiles = Some(self.profiles().await);
            }
            let profiles = profiles.as_deref().unwrap_or(&[ProfileId::PRIMARY]);

            match self.apply(package, target, profiles, &exclusions).await {
                Ok(succeeded) => {
                    info!(
                        package = %package,
                        enabled = target,
                        profiles = succeeded,
                        "Package state corrected"
                    );
                    let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PackageToggled {
                        package: package.clone(),
                        enabled: target,
                        profiles: succeeded,
                    }));
                    if target {
                        report.enabled.push(package.clone());
                    } else {
                        report.disabled.push(package.clone());
                    }
                }
                Err(e) => {
                    warn!(package = %package, enabled = target, error = %e, "Correction failed");
                    report.failures.push(ApplyFailure {
                        package: package.clone(),
                        target_enabled: target,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.store.save_managed(&plan.declared_scope)?;

        report.desired_restricted = plan.desired_restricted;
        report.finished_at = discipline_util::now();
        if !report.failures.is_empty() {
            report.outcome = RunOutcome::Failed {
                reason: format!("{} package(s) could not be corrected", report.failures.len()),
            };
        }

        info!(
            inspected = report.inspected,
            changed = report.changed(),
            failed = report.failures.len(),
            "Reconciliation finished"
        );

        Ok(report)
    }

    /// A corrupt record is dropped and overwritten at the end of the run
    fn load_memory(&self) -> Result<BTreeSet<PackageName>, StoreError> {
        match self.store.load_managed() {
            Err(StoreError::Serialization(e)) => {
                warn!(error = %e, "Management memory is corrupt, starting from declared scope");
                Ok(BTreeSet::new())
            }
            other => other,
        }
    }

    async fn profiles(&self) -> Vec<ProfileId> {
        match self.executor.enumerate_profiles().await {
            Ok(profiles) if !profiles.is_empty() => profiles,
            Ok(_) => vec![ProfileId::PRIMARY],
            Err(e) => {
                warn!(error = %e, "Profile enumeration failed, using primary profile only");
                vec![ProfileId::PRIMARY]
            }
        }
    }

    /// Apply on every profile; succeeds if at least one profile did
    async fn apply(
        &self,
        package: &PackageName,
        enabled: bool,
        profiles: &[ProfileId],
        exclusions: &SafetyExclusions,
    ) -> Result<usize, ExecutorError> {
        if !enabled && exclusions.contains(package) {
            error!(package = %package, "Refusing to disable protected package");
            let _ = self.store.append_audit(AuditEvent::new(
                AuditEventType::ProtectedPackageRefused {
                    package: package.clone(),
                },
            ));
            return Err(ExecutorError::Protected(package.clone()));
        }

        let mut succeeded = 0;
        let mut last_error = None;
        for &profile in profiles {
            match self.executor.set_enabled(package, profile, enabled).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    debug!(package = %package, profile = %profile, error = %e, "Profile update failed");
                    last_error = Some(e);
                }
            }
        }

        match (succeeded, last_error) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(ExecutorError::Internal("no profiles to apply to".into())),
            (n, _) => Ok(n),
        }
    }
}
