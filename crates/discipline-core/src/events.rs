//! Change notices emitted by the core

use discipline_api::RunSummary;

/// Broadcast after every mutation and every reconciliation run.
///
/// Subscribers use mutation notices as a second path to request a run,
/// independent of the immediate run the manager starts itself.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    PoliciesChanged { policy_count: usize },
    GroupsChanged { group_count: usize },
    ReconcileFinished(RunSummary),
}

impl CoreEvent {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            CoreEvent::PoliciesChanged { .. } | CoreEvent::GroupsChanged { .. }
        )
    }
}
