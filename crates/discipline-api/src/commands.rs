//! Command types for the discipline protocol

use discipline_util::{ClientId, GroupId, PackageName, PolicyId};
use serde::{Deserialize, Serialize};

use crate::{
    GroupDocument, HealthStatus, PackageView, PolicyDocument, RunSummary, SettingsUpdate,
    SettingsView, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    ValidationFailed,
    PermissionDenied,
    ExecutorUnavailable,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Ping,

    GetHealth,

    ListPolicies,

    /// Create (empty id) or replace a policy
    SavePolicy { policy: PolicyDocument },

    DeletePolicy { policy_id: PolicyId },

    ListGroups,

    /// Create (empty id) or replace a group
    SaveGroup { group: GroupDocument },

    DeleteGroup { group_id: GroupId },

    /// Run a reconciliation now and wait for its summary
    ReconcileNow,

    /// Packages the current policies want disabled right now
    GetRestricted,

    /// Installed third-party packages with restriction annotations
    ListPackages,

    GetSettings,

    UpdateSettings { update: SettingsUpdate },

    /// Switching force mode off is allowed once per day
    SetForceMode { enabled: bool },

    /// Spend one of today's unlocks
    UseUnlock,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,
}

impl Command {
    /// Whether this command mutates policies, groups, settings, or
    /// package state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::SavePolicy { .. }
                | Command::DeletePolicy { .. }
                | Command::SaveGroup { .. }
                | Command::DeleteGroup { .. }
                | Command::ReconcileNow
                | Command::UpdateSettings { .. }
                | Command::SetForceMode { .. }
                | Command::UseUnlock
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ResponsePayload {
    Pong,
    Health(HealthStatus),
    Policies(Vec<PolicyDocument>),
    PolicySaved { policy_id: PolicyId },
    PolicyDeleted { existed: bool },
    Groups(Vec<GroupDocument>),
    GroupSaved { group_id: GroupId },
    GroupDeleted { existed: bool },
    ReconcileFinished(RunSummary),
    Restricted(Vec<PackageName>),
    Packages(Vec<PackageView>),
    Settings(SettingsView),
    /// Force mode was already switched off once today
    ForceModeLocked,
    UnlockGranted { remaining: u32 },
    UnlockDenied,
    Subscribed { client_id: ClientId },
    Unsubscribed,
}
