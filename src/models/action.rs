// The wire contract between the core and a node: requests the dispatcher
// sends, and the terminal/intermediate results nodes report back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::new_ulid;

/// Status of a single action invocation, as reported by a node.
///
/// `not_ready` is treated uniformly here - whether a node reports it at the
/// action level or the workcell reports it at the node level, it means the
/// same thing to the scheduler: try again next tick, no progress committed
/// (an open question the distilled source left ambiguous; resolved in
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    NotStarted,
    NotReady,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Paused,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Failed | ActionStatus::Cancelled)
    }
}

/// One reported error from a node or from the dispatcher synthesizing a
/// failure on the node's behalf (connection refused, timeout, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Request to perform an action on a node. `action_id` is generated by the
/// dispatcher, not the caller, so that a restarted dispatcher can recover a
/// result by re-querying `get_action_result(action_id)` instead of
/// resubmitting (§4.F idempotence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action_id: String,
    pub action_name: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl ActionRequest {
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_id: new_ulid(),
            action_name: action_name.into(),
            args: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: HashMap<String, serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_files(mut self, files: HashMap<String, String>) -> Self {
        self.files = files;
        self
    }

    pub fn succeeded(&self, data: HashMap<String, serde_json::Value>) -> ActionResult {
        ActionResult {
            action_id: self.action_id.clone(),
            status: ActionStatus::Succeeded,
            errors: Vec::new(),
            data,
            files: HashMap::new(),
        }
    }

    pub fn failed(&self, errors: Vec<ActionError>) -> ActionResult {
        ActionResult {
            action_id: self.action_id.clone(),
            status: ActionStatus::Failed,
            errors,
            data: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn running(&self) -> ActionResult {
        ActionResult {
            action_id: self.action_id.clone(),
            status: ActionStatus::Running,
            errors: Vec::new(),
            data: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn not_ready(&self, errors: Vec<ActionError>) -> ActionResult {
        ActionResult {
            action_id: self.action_id.clone(),
            status: ActionStatus::NotReady,
            errors,
            data: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn cancelled(&self) -> ActionResult {
        ActionResult {
            action_id: self.action_id.clone(),
            status: ActionStatus::Cancelled,
            errors: Vec::new(),
            data: HashMap::new(),
            files: HashMap::new(),
        }
    }
}

/// Result of an action, whether terminal or intermediate (`running`,
/// `not_ready`). This is the shape persisted into `step.results[action_id]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub errors: Vec<ActionError>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub files: HashMap<String, String>,
}

/// Advertised by a node's `info.actions`; the Workflow Compiler validates
/// submitted step args/files against this before a workflow ever reaches the
/// scheduler (§4.D.3). Replaces the source's runtime type-sniffing with a
/// schema known at compile time (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub args: HashMap<String, ActionArgumentDefinition>,
    #[serde(default)]
    pub files: HashMap<String, ActionFileDefinition>,
    #[serde(default)]
    pub results: HashMap<String, ActionResultDefinition>,
    #[serde(default)]
    pub blocking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionArgumentDefinition {
    pub name: String,
    pub description: String,
    /// Declared type as a string ("string", "integer", "number", "boolean",
    /// "object", "array") - checked structurally against the JSON value
    /// bound to this arg, not against a Rust type (args arrive as JSON).
    #[serde(rename = "type")]
    pub arg_type: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFileDefinition {
    pub name: String,
    pub required: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResultDefinition {
    pub result_label: String,
    pub description: Option<String>,
    pub result_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders_carry_the_action_id_forward() {
        let req = ActionRequest::new("transfer");
        let ok = req.succeeded(HashMap::new());
        let err = req.failed(vec![ActionError::new("boom")]);
        assert_eq!(ok.action_id, req.action_id);
        assert_eq!(err.action_id, req.action_id);
        assert_eq!(ok.status, ActionStatus::Succeeded);
        assert_eq!(err.status, ActionStatus::Failed);
    }

    #[test]
    fn not_ready_is_not_terminal() {
        assert!(!ActionStatus::NotReady.is_terminal());
        assert!(ActionStatus::Succeeded.is_terminal());
        assert!(ActionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn action_ids_round_trip_through_json() {
        let req = ActionRequest::new("move");
        let json = serde_json::to_string(&req).unwrap();
        let back: ActionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action_id, req.action_id);
        assert_eq!(back.action_name, "move");
    }
}
