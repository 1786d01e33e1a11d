//! Policy manager
//!
//! The surface clients use: policy and group CRUD, manual runs, derived
//! views for display, and the global settings. Every mutation persists
//! first, then emits a change notice, re-arms the periodic alarm and starts
//! an immediate background run.

use chrono::{DateTime, Local, NaiveDate};
use discipline_api::{
    GroupDocument, PackageView, PolicyDocument, RunSummary, SettingsUpdate, SettingsView,
};
use discipline_config::{Group, Policy};
use discipline_store::{AuditEvent, AuditEventType, Store};
use discipline_util::{GroupId, PackageName, PolicyId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use crate::driver::{RunTrigger, SchedulerDriver};
use crate::error::{CoreError, CoreResult};
use crate::events::CoreEvent;
use crate::reconciler::Reconciler;
use crate::scope::restricting_policies;
use crate::settings::SettingsService;
use crate::state::PolicySet;

pub struct PolicyManager {
    store: Arc<dyn Store>,
    reconciler: Arc<Reconciler>,
    driver: Arc<SchedulerDriver>,
    settings: Mutex<SettingsService>,
    events: broadcast::Sender<CoreEvent>,
}

impl PolicyManager {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: Arc<Reconciler>,
        driver: Arc<SchedulerDriver>,
        settings: SettingsService,
        events: broadcast::Sender<CoreEvent>,
    ) -> Self {
        Self {
            store,
            reconciler,
            driver,
            settings: Mutex::new(settings),
            events,
        }
    }

    pub fn driver(&self) -> &Arc<SchedulerDriver> {
        &self.driver
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn executor_ready(&self) -> bool {
        self.reconciler.executor().ready().await
    }

    pub fn store_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    // Policies

    pub fn list_policies(&self) -> CoreResult<Vec<PolicyDocument>> {
        Ok(self.store.list_policies()?)
    }

    /// Validate and store a policy; an empty id gets a fresh one
    pub fn save_policy(&self, mut doc: PolicyDocument) -> CoreResult<PolicyId> {
        if doc.id.trim().is_empty() {
            doc.id = PolicyId::generate().to_string();
        }
        let policy = Policy::from_document(&doc).map_err(CoreError::Validation)?;

        self.store.save_policy(&doc)?;
        info!(policy_id = %policy.id, label = %policy.label, "Policy saved");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PolicySaved {
            policy_id: policy.id.clone(),
            label: policy.label.clone(),
        }));

        let policy_count = self.store.list_policies()?.len();
        self.after_mutation(CoreEvent::PoliciesChanged { policy_count });
        Ok(policy.id)
    }

    /// Returns whether the policy existed
    pub fn delete_policy(&self, id: &PolicyId) -> CoreResult<bool> {
        let existed = self.store.delete_policy(id)?;
        if !existed {
            return Ok(false);
        }

        info!(policy_id = %id, "Policy deleted");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PolicyDeleted {
            policy_id: id.clone(),
        }));

        let policy_count = self.store.list_policies()?.len();
        self.after_mutation(CoreEvent::PoliciesChanged { policy_count });
        Ok(true)
    }

    // Groups

    pub fn list_groups(&self) -> CoreResult<Vec<GroupDocument>> {
        Ok(self.store.list_groups()?)
    }

    pub fn save_group(&self, mut doc: GroupDocument) -> CoreResult<GroupId> {
        if doc.id.trim().is_empty() {
            doc.id = GroupId::generate().to_string();
        }
        let group = Group::from_document(&doc).map_err(CoreError::Validation)?;

        self.store.save_group(&doc)?;
        info!(group_id = %group.id, name = %group.name, members = group.members.len(), "Group saved");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::GroupSaved {
            group_id: group.id.clone(),
            name: group.name.clone(),
        }));

        let group_count = self.store.list_groups()?.len();
        self.after_mutation(CoreEvent::GroupsChanged { group_count });
        Ok(group.id)
    }

    /// Policies referencing the group keep the reference; it resolves to
    /// nothing until a group with that id exists again
    pub fn delete_group(&self, id: &GroupId) -> CoreResult<bool> {
        let existed = self.store.delete_group(id)?;
        if !existed {
            return Ok(false);
        }

        info!(group_id = %id, "Group deleted");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::GroupDeleted {
            group_id: id.clone(),
        }));

        let group_count = self.store.list_groups()?.len();
        self.after_mutation(CoreEvent::GroupsChanged { group_count });
        Ok(true)
    }

    fn after_mutation(&self, event: CoreEvent) {
        let _ = self.events.send(event);
        self.driver.schedule_next();

        if Handle::try_current().is_ok() {
            self.driver.request_immediate(RunTrigger::Immediate);
        } else {
            warn!("No async runtime, immediate run not started");
        }
    }

    // Runs and derived views

    /// Run now and wait for the result
    pub async fn trigger_reconcile_now(&self) -> RunSummary {
        self.driver.run_now(RunTrigger::Manual).await.to_summary()
    }

    /// Packages the current policies want disabled
    pub async fn currently_restricted_identifiers(
        &self,
        now: DateTime<Local>,
    ) -> CoreResult<BTreeSet<PackageName>> {
        Ok(self.reconciler.preview(now).await?)
    }

    /// Installed packages minus protected ones, each annotated with the
    /// first active policy restricting it
    pub async fn installed_packages(&self, now: DateTime<Local>) -> CoreResult<Vec<PackageView>> {
        let executor = self.reconciler.executor();
        if !executor.ready().await {
            return Err(CoreError::ExecutorNotReady);
        }

        let installed = executor.list_packages().await?;
        let exclusions = self.reconciler.exclusions().await;
        let set = PolicySet::load(self.store.as_ref())?;
        let restricting = restricting_policies(&set, &exclusions, &now);

        Ok(installed
            .into_iter()
            .filter(|p| !exclusions.contains(&p.package))
            .map(|p| {
                let policy = restricting.get(&p.package);
                PackageView {
                    blocked_by: policy.map(|policy| policy.label.clone()),
                    block_schedule: policy.map(|policy| policy.window.to_string()),
                    package: p.package,
                    enabled: p.enabled,
                }
            })
            .collect())
    }

    // Settings

    pub async fn settings_view(&self, today: NaiveDate) -> SettingsView {
        self.settings.lock().await.view(today)
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
        today: NaiveDate,
    ) -> CoreResult<SettingsView> {
        let mut settings = self.settings.lock().await;
        if !update.is_empty() {
            settings.apply(&update);
            settings.save()?;
            info!(update = ?update, "Settings updated");
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::SettingsChanged));
        }
        Ok(settings.view(today))
    }

    /// Switch force mode; `None` if it was already switched off once today
    pub async fn set_force_mode(
        &self,
        enabled: bool,
        today: NaiveDate,
    ) -> CoreResult<Option<SettingsView>> {
        let mut settings = self.settings.lock().await;
        if settings.record().force_mode_enabled == enabled {
            return Ok(Some(settings.view(today)));
        }

        if enabled {
            settings.set_force_mode(true);
        } else if settings.can_disable_force_mode(today) {
            settings.record_force_mode_disabled(today);
        } else {
            info!("Force mode disable refused, already used today");
            return Ok(None);
        }
        settings.save()?;

        info!(enabled, "Force mode changed");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ForceModeChanged { enabled }));
        Ok(Some(settings.view(today)))
    }

    /// Spend one of today's unlocks; `None` if none are left
    pub async fn use_unlock(&self, today: NaiveDate) -> CoreResult<Option<u32>> {
        let mut settings = self.settings.lock().await;
        if !settings.try_use_unlock(today) {
            info!("Unlock refused, daily limit reached");
            return Ok(None);
        }
        settings.save()?;

        let remaining = settings.remaining_unlocks();
        info!(remaining, "Unlock used");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::UnlockUsed { remaining }));
        Ok(Some(remaining))
    }
}
