// A single step within a workflow: what to run (`StepDefinition`, part of
// the submitted workflow) and how it's going (`Step`, part of the
// materialized run).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::action::{ActionResult, ActionStatus};
use super::ids::new_ulid;

/// A condition gating whether a step may be dispatched, evaluated by the
/// scheduler against current node/location state before a step is handed to
/// the dispatcher. Distinct from `ActionDefinition` validation, which the
/// compiler runs once at submission time - these run on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum StepCondition {
    /// The named node must report ready before this step may run.
    NodeReady { node_name: String },
    /// The named location must be unreserved (or reserved by this
    /// workflow) before this step may run.
    LocationFree { location_name: String },
}

/// Static definition of a step, as it appears inside a `WorkflowDefinition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default = "new_ulid")]
    pub step_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub action: String,
    pub node: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub files: HashMap<String, String>,
    /// Location arguments by name: arg key -> location name. Resolved by the
    /// Workflow Compiler into `args[key]`, keyed to whatever representation
    /// `node`'s `reference` entry carries for that location (§4.D.3).
    #[serde(default)]
    pub locations: HashMap<String, String>,
    /// Labels used to tag this step's data outputs, so later steps or the
    /// caller can look them up by name instead of by step id.
    #[serde(default)]
    pub data_labels: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<StepCondition>,
}

/// Runtime record of a step within a materialized `Workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub definition: StepDefinition,
    pub status: ActionStatus,
    /// Every action result received for this step, keyed by `action_id`,
    /// preserved even across the `running`/`not_ready` intermediate results
    /// so a restarted dispatcher can recover full history on rehydrate.
    #[serde(default)]
    pub results: HashMap<String, ActionResult>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Step {
    pub fn from_definition(definition: StepDefinition) -> Self {
        Self {
            definition,
            status: ActionStatus::NotStarted,
            results: HashMap::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Record a new result, advancing `status` and stamping
    /// `start_time`/`end_time` as appropriate. Idempotent: applying the same
    /// terminal result twice leaves the step unchanged.
    pub fn apply_result(&mut self, result: ActionResult) {
        if self.start_time.is_none() {
            self.start_time = Some(chrono::Utc::now());
        }
        if result.status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(chrono::Utc::now());
        }
        self.status = result.status;
        self.results.insert(result.action_id.clone(), result);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ActionRequest;

    fn def() -> StepDefinition {
        StepDefinition {
            name: "move_plate".into(),
            step_id: new_ulid(),
            description: None,
            action: "transfer".into(),
            node: "arm1".into(),
            args: HashMap::new(),
            files: HashMap::new(),
            locations: HashMap::new(),
            data_labels: HashMap::new(),
            conditions: Vec::new(),
        }
    }

    #[test]
    fn fresh_step_is_not_started() {
        let step = Step::from_definition(def());
        assert_eq!(step.status, ActionStatus::NotStarted);
        assert!(!step.is_terminal());
    }

    #[test]
    fn applying_a_terminal_result_stamps_end_time_once() {
        let mut step = Step::from_definition(def());
        let req = ActionRequest::new("transfer");
        step.apply_result(req.succeeded(HashMap::new()));
        assert!(step.is_terminal());
        let first_end = step.end_time;
        step.apply_result(req.succeeded(HashMap::new()));
        assert_eq!(step.end_time, first_end);
    }

    #[test]
    fn not_ready_does_not_mark_terminal() {
        let mut step = Step::from_definition(def());
        let req = ActionRequest::new("transfer");
        step.apply_result(req.not_ready(Vec::new()));
        assert!(!step.is_terminal());
        assert_eq!(step.status, ActionStatus::NotReady);
    }
}
