//! Scheduler driver
//!
//! Every run, whatever started it, ends by arming the next periodic alarm.
//! Alarms are armed through a list of backends tried in order of
//! precision; a backend that is unavailable or fails hands over to the
//! next one, and the last one needs nothing but an OS thread.

use discipline_api::{RunStatus, RunSummary};
use discipline_config::ScheduleConfig;
use discipline_store::{AuditEvent, AuditEventType, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::CoreEvent;
use crate::reconciler::{Reconciler, RunOutcome, RunReport};

/// Slack applied by the approximate alarm tier
pub const INEXACT_SLACK: Duration = Duration::from_secs(5);

/// What asked for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Startup,
    /// The periodic alarm fired
    Alarm,
    /// Right after a policy or group mutation
    Immediate,
    /// A change notice picked up by a subscriber
    Broadcast,
    /// Explicit request from a client
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTier {
    Exact,
    Inexact,
    BestEffort,
}

#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("alarm tier unavailable: {0}")]
    Unavailable(&'static str),

    #[error("failed to arm alarm: {0}")]
    Failed(String),
}

/// A way of getting `RunTrigger::Alarm` delivered after a delay
pub trait AlarmBackend: Send + Sync {
    fn tier(&self) -> AlarmTier;

    fn arm(
        &self,
        delay: Duration,
        fire: mpsc::UnboundedSender<RunTrigger>,
    ) -> Result<PendingAlarm, AlarmError>;
}

enum AlarmHandle {
    Task(JoinHandle<()>),
    Thread(Arc<AtomicBool>),
}

/// An armed alarm; cancelled when dropped
pub struct PendingAlarm {
    tier: AlarmTier,
    handle: AlarmHandle,
}

impl PendingAlarm {
    pub fn tier(&self) -> AlarmTier {
        self.tier
    }

    pub fn cancel(&self) {
        match &self.handle {
            AlarmHandle::Task(task) => task.abort(),
            AlarmHandle::Thread(cancelled) => cancelled.store(true, Ordering::SeqCst),
        }
    }
}

impl Drop for PendingAlarm {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn spawn_timer(
    tier: AlarmTier,
    delay: Duration,
    fire: mpsc::UnboundedSender<RunTrigger>,
) -> Result<PendingAlarm, AlarmError> {
    let runtime = Handle::try_current().map_err(|e| AlarmError::Failed(e.to_string()))?;
    let task = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = fire.send(RunTrigger::Alarm);
    });
    Ok(PendingAlarm {
        tier,
        handle: AlarmHandle::Task(task),
    })
}

/// Precise runtime timer
pub struct ExactAlarm {
    pub enabled: bool,
}

impl AlarmBackend for ExactAlarm {
    fn tier(&self) -> AlarmTier {
        AlarmTier::Exact
    }

    fn arm(
        &self,
        delay: Duration,
        fire: mpsc::UnboundedSender<RunTrigger>,
    ) -> Result<PendingAlarm, AlarmError> {
        if !self.enabled {
            return Err(AlarmError::Unavailable("exact timers disabled in config"));
        }
        spawn_timer(AlarmTier::Exact, delay, fire)
    }
}

/// Runtime timer whose deadline is rounded up to a multiple of `slack`
pub struct InexactAlarm {
    pub slack: Duration,
}

impl InexactAlarm {
    fn coarsen(&self, delay: Duration) -> Duration {
        let slack = self.slack.as_millis();
        if slack == 0 {
            return delay;
        }
        let steps = delay.as_millis().div_ceil(slack).max(1);
        Duration::from_millis(u64::try_from(steps * slack).unwrap_or(u64::MAX))
    }
}

impl AlarmBackend for InexactAlarm {
    fn tier(&self) -> AlarmTier {
        AlarmTier::Inexact
    }

    fn arm(
        &self,
        delay: Duration,
        fire: mpsc::UnboundedSender<RunTrigger>,
    ) -> Result<PendingAlarm, AlarmError> {
        spawn_timer(AlarmTier::Inexact, self.coarsen(delay), fire)
    }
}

/// Plain OS thread sleeping out the delay; works without a runtime
pub struct BestEffortAlarm;

impl AlarmBackend for BestEffortAlarm {
    fn tier(&self) -> AlarmTier {
        AlarmTier::BestEffort
    }

    fn arm(
        &self,
        delay: Duration,
        fire: mpsc::UnboundedSender<RunTrigger>,
    ) -> Result<PendingAlarm, AlarmError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        std::thread::Builder::new()
            .name("discipline-alarm".into())
            .spawn(move || {
                std::thread::sleep(delay);
                if !flag.load(Ordering::SeqCst) {
                    let _ = fire.send(RunTrigger::Alarm);
                }
            })
            .map_err(|e| AlarmError::Failed(e.to_string()))?;

        Ok(PendingAlarm {
            tier: AlarmTier::BestEffort,
            handle: AlarmHandle::Thread(cancelled),
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs the reconciler on request and keeps the next alarm armed
pub struct SchedulerDriver {
    reconciler: Arc<Reconciler>,
    store: Arc<dyn Store>,
    interval: Duration,
    backends: Vec<Box<dyn AlarmBackend>>,
    pending: Mutex<Option<PendingAlarm>>,
    last_run: Mutex<Option<RunSummary>>,
    fire_tx: mpsc::UnboundedSender<RunTrigger>,
    fire_rx: Mutex<Option<mpsc::UnboundedReceiver<RunTrigger>>>,
    events: broadcast::Sender<CoreEvent>,
}

impl SchedulerDriver {
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn Store>,
        config: &ScheduleConfig,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        let backends: Vec<Box<dyn AlarmBackend>> = vec![
            Box::new(ExactAlarm {
                enabled: config.exact_timers,
            }),
            Box::new(InexactAlarm {
                slack: INEXACT_SLACK,
            }),
            Box::new(BestEffortAlarm),
        ];
        Self::with_backends(reconciler, store, config.interval, backends, events)
    }

    pub fn with_backends(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn Store>,
        interval: Duration,
        backends: Vec<Box<dyn AlarmBackend>>,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        Self {
            reconciler,
            store,
            interval,
            backends,
            pending: Mutex::new(None),
            last_run: Mutex::new(None),
            fire_tx,
            fire_rx: Mutex::new(Some(fire_rx)),
            events,
        }
    }

    /// Receiver for alarm fires (can only be taken once)
    pub fn take_trigger_receiver(&self) -> Option<mpsc::UnboundedReceiver<RunTrigger>> {
        lock(&self.fire_rx).take()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        lock(&self.last_run).clone()
    }

    pub fn pending_tier(&self) -> Option<AlarmTier> {
        lock(&self.pending).as_ref().map(PendingAlarm::tier)
    }

    /// Replace any pending alarm with one `interval` from now
    pub fn schedule_next(&self) -> Option<AlarmTier> {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.take() {
            previous.cancel();
        }

        for backend in &self.backends {
            match backend.arm(self.interval, self.fire_tx.clone()) {
                Ok(alarm) => {
                    let tier = alarm.tier();
                    debug!(tier = ?tier, delay = ?self.interval, "Next run scheduled");
                    *pending = Some(alarm);
                    return Some(tier);
                }
                Err(AlarmError::Unavailable(reason)) => {
                    debug!(tier = ?backend.tier(), reason, "Alarm tier unavailable");
                }
                Err(e) => {
                    warn!(tier = ?backend.tier(), error = %e, "Alarm tier failed, degrading");
                }
            }
        }

        error!("No alarm tier could be armed; runs now depend on other triggers");
        None
    }

    /// Run once, record the outcome, then arm the next alarm
    pub async fn run_now(&self, trigger: RunTrigger) -> RunReport {
        debug!(trigger = ?trigger, "Reconciliation requested");
        let report = self.reconciler.run(discipline_util::now()).await;
        let summary = report.to_summary();

        let previous = lock(&self.last_run).replace(summary.clone());
        self.audit(&report, previous.as_ref().map(|s| s.status));

        let _ = self.events.send(CoreEvent::ReconcileFinished(summary));

        self.schedule_next();
        report
    }

    /// Start a run in the background; the caller does not wait for it
    pub fn request_immediate(self: &Arc<Self>, trigger: RunTrigger) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move {
            let report = driver.run_now(trigger).await;
            if let RunOutcome::Failed { reason } = &report.outcome {
                info!(trigger = ?trigger, reason = %reason, "Background run finished with failures");
            }
        })
    }

    fn audit(&self, report: &RunReport, previous: Option<RunStatus>) {
        let event = match &report.outcome {
            // Only the transition into skipping is recorded
            RunOutcome::Skipped(reason) if previous != Some(RunStatus::Skipped) => {
                AuditEventType::ReconcileSkipped {
                    reason: format!("{:?}", reason),
                }
            }
            RunOutcome::Skipped(_) => return,
            _ if report.changed() == 0 && report.failures.is_empty() => return,
            _ => AuditEventType::ReconcileFinished {
                inspected: report.inspected,
                desired_restricted: report.desired_restricted.len(),
                changed: report.changed(),
                failed: report.failures.len(),
            },
        };
        let _ = self.store.append_audit(AuditEvent::new(event));
    }
}

impl Drop for SchedulerDriver {
    fn drop(&mut self) {
        if let Some(alarm) = lock(&self.pending).take() {
            alarm.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discipline_api::PolicyDocument;
    use discipline_executor_api::MockExecutor;
    use discipline_store::SqliteStore;

    struct Broken;

    impl AlarmBackend for Broken {
        fn tier(&self) -> AlarmTier {
            AlarmTier::Exact
        }

        fn arm(
            &self,
            _delay: Duration,
            _fire: mpsc::UnboundedSender<RunTrigger>,
        ) -> Result<PendingAlarm, AlarmError> {
            Err(AlarmError::Failed("boom".into()))
        }
    }

    fn parts() -> (Arc<SqliteStore>, Arc<MockExecutor>, Arc<Reconciler>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let exec = Arc::new(MockExecutor::new().with_packages(["com.example.game"]));
        let reconciler = Arc::new(Reconciler::new(store.clone(), exec.clone(), vec![]));
        (store, exec, reconciler)
    }

    fn driver(interval: Duration, exact: bool) -> (Arc<SqliteStore>, Arc<MockExecutor>, SchedulerDriver) {
        let (store, exec, reconciler) = parts();
        let (events, _) = broadcast::channel(16);
        let config = ScheduleConfig {
            interval,
            exact_timers: exact,
        };
        let driver = SchedulerDriver::new(reconciler, store.clone(), &config, events);
        (store, exec, driver)
    }

    #[tokio::test]
    async fn exact_tier_preferred() {
        let (_, _, driver) = driver(Duration::from_secs(60), true);
        assert_eq!(driver.schedule_next(), Some(AlarmTier::Exact));
        assert_eq!(driver.pending_tier(), Some(AlarmTier::Exact));
    }

    #[tokio::test]
    async fn degrades_when_exact_unavailable() {
        let (_, _, driver) = driver(Duration::from_secs(60), false);
        assert_eq!(driver.schedule_next(), Some(AlarmTier::Inexact));
    }

    #[tokio::test]
    async fn degrades_past_failing_backends() {
        let (store, _, reconciler) = parts();
        let (events, _) = broadcast::channel(16);
        let backends: Vec<Box<dyn AlarmBackend>> =
            vec![Box::new(Broken), Box::new(Broken), Box::new(BestEffortAlarm)];
        let driver = SchedulerDriver::with_backends(
            reconciler,
            store,
            Duration::from_secs(60),
            backends,
            events,
        );
        assert_eq!(driver.schedule_next(), Some(AlarmTier::BestEffort));
    }

    #[test]
    fn best_effort_works_without_runtime() {
        let (_, _, driver) = driver(Duration::from_millis(10), true);
        let mut fires = driver.take_trigger_receiver().unwrap();

        assert_eq!(driver.schedule_next(), Some(AlarmTier::BestEffort));
        assert_eq!(fires.blocking_recv(), Some(RunTrigger::Alarm));
    }

    #[tokio::test]
    async fn alarm_fires_once_after_replacement() {
        let (_, _, driver) = driver(Duration::from_millis(20), true);
        let mut fires = driver.take_trigger_receiver().unwrap();
        assert!(driver.take_trigger_receiver().is_none());

        driver.schedule_next();
        driver.schedule_next();

        let first = tokio::time::timeout(Duration::from_secs(2), fires.recv()).await;
        assert_eq!(first.unwrap(), Some(RunTrigger::Alarm));

        let second = tokio::time::timeout(Duration::from_millis(200), fires.recv()).await;
        assert!(second.is_err());
    }

    #[test]
    fn inexact_rounds_up_to_slack() {
        let alarm = InexactAlarm {
            slack: Duration::from_secs(5),
        };
        assert_eq!(alarm.coarsen(Duration::from_secs(60)), Duration::from_secs(60));
        assert_eq!(alarm.coarsen(Duration::from_secs(61)), Duration::from_secs(65));
        assert_eq!(alarm.coarsen(Duration::ZERO), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn skipped_run_still_reschedules() {
        let (_, exec, driver) = driver(Duration::from_secs(60), true);
        exec.set_ready(false);

        let report = driver.run_now(RunTrigger::Alarm).await;
        assert!(report.is_skipped());
        assert_eq!(driver.pending_tier(), Some(AlarmTier::Exact));
        assert_eq!(driver.last_run().unwrap().status, RunStatus::Skipped);
    }

    #[tokio::test]
    async fn run_broadcasts_summary_and_audits_changes() {
        let (store, _, reconciler) = parts();
        let (events, mut rx) = broadcast::channel(16);
        let driver = SchedulerDriver::new(reconciler, store.clone(), &ScheduleConfig::default(), events);

        let mut doc = PolicyDocument::new("always", "00:00", "23:59");
        doc.id = "p1".into();
        doc.is_force_mode = true;
        doc.packages = vec!["com.example.game".into()];
        store.save_policy(&doc).unwrap();

        let report = driver.run_now(RunTrigger::Manual).await;
        assert_eq!(report.changed(), 1);

        match rx.try_recv().unwrap() {
            CoreEvent::ReconcileFinished(summary) => {
                assert_eq!(summary.status, RunStatus::Applied);
                assert_eq!(summary.disabled.len(), 1);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let audits = store.get_recent_audits(10).unwrap();
        assert!(audits.iter().any(|a| matches!(
            a.event,
            AuditEventType::ReconcileFinished { changed: 1, .. }
        )));

        // A second, no-op run is not audited again
        driver.run_now(RunTrigger::Alarm).await;
        let finished = store
            .get_recent_audits(10)
            .unwrap()
            .into_iter()
            .filter(|a| matches!(a.event, AuditEventType::ReconcileFinished { .. }))
            .count();
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn immediate_runs_in_background() {
        let (_, exec, driver) = driver(Duration::from_secs(60), true);
        let driver = Arc::new(driver);

        driver.request_immediate(RunTrigger::Immediate).await.unwrap();
        assert!(driver.last_run().is_some());
        assert!(exec.calls().is_empty());
    }
}
