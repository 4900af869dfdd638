// Ownership tags threaded explicitly through the compiler -> scheduler ->
// dispatcher chain. The source this was distilled from threads an
// equivalent value through a process-wide context var; here it is always an
// explicit argument (see DESIGN.md's notes on the ownership redesign flag).

use serde::{Deserialize, Serialize};

/// Who is responsible for a workflow run, a step, or a reservation.
///
/// All fields are optional tags, not enforced identities - the core carries
/// ownership for bookkeeping and reservation checks only; it does not
/// authenticate or authorize anything (§1 Non-goals).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipInfo {
    pub user_id: Option<String>,
    pub experiment_id: Option<String>,
    pub workflow_id: Option<String>,
    pub step_id: Option<String>,
    pub node_id: Option<String>,
}

impl OwnershipInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(workflow_id.into()),
            ..Default::default()
        }
    }

    /// True if `self` and `other` share at least one non-empty tag, i.e.
    /// `other` is entitled to act where `self` holds a reservation.
    ///
    /// An all-`None` `self` belongs to nobody in particular and is checked
    /// by nobody; an all-`None` `other` can never match a concrete owner.
    pub fn matches(&self, other: &OwnershipInfo) -> bool {
        macro_rules! overlap {
            ($field:ident) => {
                matches!((&self.$field, &other.$field), (Some(a), Some(b)) if a == b)
            };
        }
        overlap!(user_id)
            || overlap!(experiment_id)
            || overlap!(workflow_id)
            || overlap!(step_id)
            || overlap!(node_id)
    }
}
