//! Store trait definitions

use chrono::NaiveDate;
use discipline_api::{GroupDocument, PolicyDocument, DEFAULT_UNLOCK_LIMIT};
use discipline_util::{GroupId, PackageName, PolicyId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Policies

    /// All readable policy documents in creation order. Records that no
    /// longer deserialize are skipped, not fatal.
    fn list_policies(&self) -> StoreResult<Vec<PolicyDocument>>;

    fn get_policy(&self, id: &PolicyId) -> StoreResult<Option<PolicyDocument>>;

    /// Insert or replace by `doc.id`; a replaced record keeps its position
    fn save_policy(&self, doc: &PolicyDocument) -> StoreResult<()>;

    /// Returns whether a record was removed
    fn delete_policy(&self, id: &PolicyId) -> StoreResult<bool>;

    // Groups

    fn list_groups(&self) -> StoreResult<Vec<GroupDocument>>;

    fn get_group(&self, id: &GroupId) -> StoreResult<Option<GroupDocument>>;

    fn save_group(&self, doc: &GroupDocument) -> StoreResult<()>;

    fn delete_group(&self, id: &GroupId) -> StoreResult<bool>;

    // Management memory

    /// Packages under management as of the last run (empty if never saved)
    fn load_managed(&self) -> StoreResult<BTreeSet<PackageName>>;

    /// Replace the management memory
    fn save_managed(&self, packages: &BTreeSet<PackageName>) -> StoreResult<()>;

    // Settings

    fn load_settings(&self) -> StoreResult<Option<SettingsRecord>>;

    fn save_settings(&self, settings: &SettingsRecord) -> StoreResult<()>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Persisted global override settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    pub force_mode_enabled: bool,
    pub unlock_limit: u32,
    pub unlocks_used_today: u32,
    pub last_unlock_date: Option<NaiveDate>,
    pub force_mode_delay_secs: u64,
    pub force_unlock_delay_secs: u64,
    pub last_force_mode_disable_date: Option<NaiveDate>,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            force_mode_enabled: false,
            unlock_limit: DEFAULT_UNLOCK_LIMIT,
            unlocks_used_today: 0,
            last_unlock_date: None,
            force_mode_delay_secs: 0,
            force_unlock_delay_secs: 0,
            last_force_mode_disable_date: None,
        }
    }
}
