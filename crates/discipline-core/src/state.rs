//! Policy snapshot loaded from the store at the start of each run

use discipline_config::{Group, Policy};
use discipline_store::{Store, StoreResult};
use discipline_util::GroupId;
use std::collections::HashMap;
use tracing::warn;

/// All usable policies and groups at one point in time
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    pub policies: Vec<Policy>,
    pub groups: HashMap<GroupId, Group>,
}

impl PolicySet {
    pub fn new(policies: Vec<Policy>, groups: impl IntoIterator<Item = Group>) -> Self {
        Self {
            policies,
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
        }
    }

    /// Read every document; ones that fail validation are skipped
    pub fn load(store: &dyn Store) -> StoreResult<Self> {
        let policies = store
            .list_policies()?
            .iter()
            .filter_map(|doc| match Policy::from_document(doc) {
                Ok(policy) => Some(policy),
                Err(errors) => {
                    warn!(policy_id = %doc.id, errors = ?errors, "Skipping invalid policy");
                    None
                }
            })
            .collect();

        let groups = store
            .list_groups()?
            .iter()
            .filter_map(|doc| match Group::from_document(doc) {
                Ok(group) => Some(group),
                Err(errors) => {
                    warn!(group_id = %doc.id, errors = ?errors, "Skipping invalid group");
                    None
                }
            })
            .collect::<Vec<_>>();

        Ok(Self::new(policies, groups))
    }
}
