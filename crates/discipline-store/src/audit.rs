//! Audit event types

use chrono::{DateTime, Local};
use discipline_util::{GroupId, PackageName, PolicyId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    DaemonStarted,

    DaemonStopped,

    PolicySaved { policy_id: PolicyId, label: String },

    PolicyDeleted { policy_id: PolicyId },

    GroupSaved { group_id: GroupId, name: String },

    GroupDeleted { group_id: GroupId },

    /// A run completed; `failed` counts packages left uncorrected
    ReconcileFinished {
        inspected: usize,
        desired_restricted: usize,
        changed: usize,
        failed: usize,
    },

    /// A run did nothing
    ReconcileSkipped { reason: String },

    /// A run aborted before applying anything
    ReconcileFailed { message: String },

    /// A package's enabled state was changed on at least one profile
    PackageToggled {
        package: PackageName,
        enabled: bool,
        profiles: usize,
    },

    /// A disable for a protected package was refused
    ProtectedPackageRefused { package: PackageName },

    UnlockUsed { remaining: u32 },

    SettingsChanged,

    ForceModeChanged { enabled: bool },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: discipline_util::now(),
            event,
        }
    }
}
