// The transfer graph's static inputs: templates describing how a node can
// move a resource between two locations. Templates don't name a fixed
// source/target pair - the Transfer Graph derives which location pairs a
// template actually connects from which locations share that template's node
// in their `reference` map (`engine::transfer_graph`), mirroring
// `transfer_planner.py::_can_transfer_between_locations`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Action a transfer template dispatches when no template overrides it.
pub const TRANSFER_ACTION_NAME: &str = "transfer";

fn default_action_name() -> String {
    TRANSFER_ACTION_NAME.to_string()
}

fn default_cost_weight() -> f64 {
    1.0
}

/// A node's declared ability to move a resource between any two locations it
/// can reach, as it appears in a `WorkcellDefinition`. Unlike a fixed edge, a
/// template is topology-agnostic: the same template connects every pair of
/// locations that both carry a `reference` entry for `node_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferTemplate {
    pub template_name: String,
    pub node_name: String,
    /// Action dispatched to `node_name` to perform the move. Defaults to
    /// `TRANSFER_ACTION_NAME` so a definition doesn't have to repeat it.
    #[serde(default = "default_action_name")]
    pub action_name: String,
    /// Step arg key the source location's name is bound to.
    pub source_arg_name: String,
    /// Step arg key the destination location's name is bound to.
    pub target_arg_name: String,
    /// Dijkstra edge weight. Lower is preferred; defaults to 1.0 when a
    /// definition doesn't specify one, matching the source's
    /// `template.cost_weight or 1.0`.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
    /// Args merged into every step this template produces, before any
    /// location- or user-supplied value (§4.D.4 merge precedence).
    #[serde(default)]
    pub default_args: HashMap<String, serde_json::Value>,
}
