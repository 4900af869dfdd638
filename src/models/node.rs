// Node definitions (static, part of the workcell topology) and node runtime
// state (status/info/reservation, refreshed by the liveness poller).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::action::ActionDefinition;
use super::ids::new_ulid;
use super::ownership::OwnershipInfo;

/// What a node's module declares it can do. Used by the Workflow Compiler to
/// reject workflows referencing unsupported actions before they ever reach
/// the scheduler, and by the Ingress API to report module capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeCapabilities {
    #[serde(default)]
    pub get_info: bool,
    #[serde(default)]
    pub get_state: bool,
    #[serde(default)]
    pub get_status: bool,
    #[serde(default)]
    pub send_action: bool,
    #[serde(default)]
    pub get_action_result: bool,
    #[serde(default)]
    pub get_action_history: bool,
    #[serde(default)]
    pub action_files: bool,
    #[serde(default)]
    pub send_admin_commands: bool,
    #[serde(default)]
    pub set_config: bool,
    #[serde(default)]
    pub get_resources: bool,
    #[serde(default)]
    pub get_log: bool,
    #[serde(default)]
    pub admin_commands: HashSet<AdminCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminCommand {
    Pause,
    Resume,
    Cancel,
    Shutdown,
    Reset,
    Lock,
    Unlock,
    Safen,
}

/// Static definition of a node, as it appears in a `WorkcellDefinition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub node_name: String,
    #[serde(default = "new_ulid")]
    pub node_id: String,
    pub node_url: Option<String>,
    #[serde(default)]
    pub node_description: Option<String>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub module_version: Option<String>,
    #[serde(default)]
    pub capabilities: NodeCapabilities,
    #[serde(default)]
    pub commands: HashMap<String, String>,
    #[serde(default)]
    pub config_defaults: HashMap<String, serde_json::Value>,
}

/// `NodeInfo` is what a node reports about itself over `get_info`: its
/// definition plus the actions it actually advertises and its live config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(flatten)]
    pub definition: NodeDefinition,
    #[serde(default)]
    pub actions: HashMap<String, ActionDefinition>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub config_schema: Option<serde_json::Value>,
}

/// Liveness/health snapshot refreshed by the Node Liveness Poller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub running_actions: HashSet<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub errored: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub initializing: bool,
    #[serde(default)]
    pub waiting_for_config: HashSet<String>,
}

impl NodeStatus {
    /// Computed readiness predicate: a node is ready to accept an action
    /// only when none of these flags are set.
    pub fn ready(&self) -> bool {
        !(self.busy
            || self.locked
            || self.stopped
            || self.errored
            || self.initializing
            || self.paused
            || !self.waiting_for_config.is_empty())
    }

    /// Human-readable reason the node isn't ready, mirroring `ready()`'s
    /// flag order so the two never disagree about which flag "wins".
    pub fn description(&self) -> String {
        if self.stopped {
            return "Node is stopped".to_string();
        }
        if self.errored {
            return format!("Node has errored: {:?}", self.errors);
        }
        if self.initializing {
            return "Node is initializing".to_string();
        }
        if self.locked {
            return "Node is locked".to_string();
        }
        if self.paused {
            return "Node is paused".to_string();
        }
        if !self.waiting_for_config.is_empty() {
            return format!("Node is waiting for config: {:?}", self.waiting_for_config);
        }
        if self.busy {
            return format!("Node is busy running: {:?}", self.running_actions);
        }
        "Node is ready".to_string()
    }
}

/// A reservation held against a node, blocking other owners from
/// dispatching actions to it during `[start, end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReservation {
    pub owned_by: OwnershipInfo,
    pub created: chrono::DateTime<chrono::Utc>,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
}

impl NodeReservation {
    /// True if `requester` may act on the reserved node right now: either
    /// `requester` is the owner, or the reservation window isn't active.
    pub fn check(&self, requester: &OwnershipInfo) -> bool {
        let now = chrono::Utc::now();
        let within_window = self.start <= now && now <= self.end;
        self.owned_by.matches(requester) || !within_window
    }
}

/// Runtime record of a node: its static identity plus whatever the poller
/// last observed. This is what the State Store keeps under
/// `madsci:workcell:{id}:nodes:{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_url: String,
    pub status: Option<NodeStatus>,
    pub info: Option<NodeInfo>,
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
    pub reserved_by: Option<NodeReservation>,
}

impl Node {
    pub fn new(node_url: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            status: None,
            info: None,
            state: HashMap::new(),
            reserved_by: None,
        }
    }

    /// A node is available to dispatch to when the poller has ever heard
    /// from it, it reports ready, and no active reservation blocks `by`.
    pub fn ready_for(&self, by: &OwnershipInfo) -> bool {
        let status_ready = self.status.as_ref().map(NodeStatus::ready).unwrap_or(false);
        let unreserved = self.reserved_by.as_ref().map(|r| r.check(by)).unwrap_or(true);
        status_ready && unreserved
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCommandResponse {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}
