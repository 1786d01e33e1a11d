//! Shared types for the discipline protocol

use chrono::{DateTime, Local};
use discipline_util::{ClientId, PackageName};
use serde::{Deserialize, Serialize};

/// Final state of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every inspected package was brought to (or already at) its target
    Applied,
    /// Nothing was done because the privileged executor was not ready
    Skipped,
    /// The run finished but some packages could not be corrected, or
    /// state could not be loaded or saved
    Failed,
}

/// Summary of a reconciliation run, broadcast to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub finished_at: DateTime<Local>,
    /// Packages inspected this run (declared scope plus remembered scope)
    pub inspected: usize,
    /// Packages that should currently be disabled
    pub desired_restricted: usize,
    /// Packages re-enabled by this run
    pub enabled: Vec<PackageName>,
    /// Packages disabled by this run
    pub disabled: Vec<PackageName>,
    /// Packages whose correction failed on every profile
    pub failed: Vec<PackageName>,
    pub message: Option<String>,
}

impl RunSummary {
    pub fn changed(&self) -> usize {
        self.enabled.len() + self.disabled.len()
    }
}

/// An installed package, annotated for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageView {
    pub package: PackageName,
    pub enabled: bool,
    /// Label of the first active policy restricting this package
    pub blocked_by: Option<String>,
    /// Window of that policy, e.g. "22:00~07:00"
    pub block_schedule: Option<String>,
}

/// Global override settings as shown to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsView {
    pub force_mode_enabled: bool,
    pub unlock_limit: u32,
    pub unlocks_used_today: u32,
    pub remaining_unlocks: u32,
    pub force_mode_delay_secs: u64,
    pub force_unlock_delay_secs: u64,
    pub can_disable_force_mode: bool,
}

/// Partial change to the global settings; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_mode_delay_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_unlock_delay_secs: Option<u64>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.unlock_limit.is_none()
            && self.force_mode_delay_secs.is_none()
            && self.force_unlock_delay_secs.is_none()
    }
}

/// Client role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Same user as the daemon (or root) - may edit policies
    Admin,
    /// Any other local user - may only read
    Observer,
}

impl ClientRole {
    pub fn can_edit(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_trigger(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub executor_ready: bool,
    pub store_ok: bool,
    pub policy_count: usize,
    pub last_run: Option<RunSummary>,
}
