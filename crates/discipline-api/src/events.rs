//! Event types for daemon -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{RunSummary, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: discipline_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The policy list was modified
    PoliciesChanged { policy_count: usize },

    /// The group list was modified
    GroupsChanged { group_count: usize },

    /// A reconciliation run finished (any outcome)
    ReconcileFinished(RunSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tagging() {
        let event = Event::new(EventPayload::PoliciesChanged { policy_count: 2 });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"policies_changed\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.payload,
            EventPayload::PoliciesChanged { policy_count: 2 }
        ));
    }
}
