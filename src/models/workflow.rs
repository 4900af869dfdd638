// Workflow definitions (submitted) and materialized workflow runs.
//
// A `WorkflowDefinition` is what a caller submits: an ordered list of
// steps plus metadata and parameter placeholders. A `Workflow` is what the
// compiler turns it into: a concrete run with a minted id, resolved
// parameters, ownership, and per-step runtime state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::new_ulid;
use super::ownership::OwnershipInfo;
use super::step::{Step, StepDefinition};

/// A named, optionally-defaulted placeholder a `WorkflowDefinition` can
/// reference from step args via `${param_name}` substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowParameter {
    pub name: String,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Static definition of a workflow, as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub workflow_metadata: WorkflowMetadata,
    #[serde(default)]
    pub parameters: Vec<WorkflowParameter>,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Every step's `data_labels` values must be unique across the whole
    /// workflow, so later steps and callers can look a datapoint up by
    /// label without ambiguity. Mirrors the uniqueness check the compiler
    /// runs once at submission time.
    pub fn validate_unique_data_labels(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            for label in step.data_labels.values() {
                if !seen.insert(label.clone()) {
                    return Err(format!("duplicate data label '{}' across steps", label));
                }
            }
        }
        Ok(())
    }
}

/// Scheduler bookkeeping attached to a materialized workflow: whether it's
/// currently eligible to advance, its computed priority, and why (for
/// diagnostics surfaced through the Ingress API).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerMetadata {
    #[serde(default)]
    pub ready_to_run: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Status of a materialized workflow run. `current_step_index` is the
/// index of the step the scheduler is currently working on or about to
/// dispatch; the computed predicates below derive entirely from these four
/// fields, never stored separately, so they can never drift out of sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStatus {
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub cancelled: bool,
}

impl WorkflowStatus {
    pub fn reset(&mut self, step_index: usize) {
        self.current_step_index = step_index;
        self.paused = false;
        self.completed = false;
        self.failed = false;
        self.cancelled = false;
    }

    pub fn terminal(&self) -> bool {
        self.completed || self.failed || self.cancelled
    }

    /// Queued means eligible to run but not currently being worked: active,
    /// but not yet dispatched a running step.
    pub fn queued(&self) -> bool {
        self.active() && !self.running()
    }

    pub fn active(&self) -> bool {
        !(self.terminal() || self.paused)
    }

    pub fn running(&self) -> bool {
        self.active() && self.started()
    }

    pub fn started(&self) -> bool {
        self.current_step_index > 0
    }

    /// True unless the run ended in failure or was cancelled - mirrors a
    /// caller's "did this go as intended" question, distinct from `terminal`.
    pub fn ok(&self) -> bool {
        !(self.failed || self.cancelled)
    }

    pub fn description(&self) -> String {
        if self.completed {
            return "Completed".to_string();
        }
        if self.cancelled {
            return format!("Cancelled on step {}", self.current_step_index);
        }
        if self.failed {
            return format!("Failed on step {}", self.current_step_index);
        }
        if self.paused {
            return format!("Paused on step {}", self.current_step_index);
        }
        if self.started() {
            return format!("Running step {}", self.current_step_index);
        }
        "Queued".to_string()
    }
}

/// A materialized workflow run: the submitted definition plus everything
/// the compiler resolved and everything the scheduler/dispatcher have
/// since observed. Persisted wholesale under
/// `madsci:workcell:{id}:workflows:{workflow_id}` while active, and moved
/// to the archive bucket atomically on the transition into `terminal()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "new_ulid")]
    pub workflow_id: String,
    pub name: String,
    #[serde(default)]
    pub workflow_metadata: WorkflowMetadata,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parameter_values: HashMap<String, serde_json::Value>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub step_definitions: Vec<StepDefinition>,
    pub ownership_info: OwnershipInfo,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub scheduler_metadata: SchedulerMetadata,
    #[serde(default)]
    pub simulate: bool,
    pub submitted_time: chrono::DateTime<chrono::Utc>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Workflow {
    /// Compile a submitted definition into a fresh run. Parameters are
    /// resolved here, once, so the scheduler and dispatcher never need to
    /// see an unresolved `${...}` placeholder again.
    pub fn from_definition(
        definition: WorkflowDefinition,
        parameter_values: HashMap<String, serde_json::Value>,
        ownership_info: OwnershipInfo,
    ) -> Self {
        let step_definitions = definition.steps.clone();
        let steps = definition
            .steps
            .into_iter()
            .map(Step::from_definition)
            .collect();
        Self {
            workflow_id: new_ulid(),
            name: definition.name,
            workflow_metadata: definition.workflow_metadata,
            label: None,
            parameter_values,
            steps,
            step_definitions,
            ownership_info,
            status: WorkflowStatus::default(),
            scheduler_metadata: SchedulerMetadata::default(),
            simulate: false,
            submitted_time: chrono::Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn get_step_by_name(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.definition.name == name)
    }

    pub fn get_step_by_id(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.definition.step_id == step_id)
    }

    pub fn get_step_by_id_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.definition.step_id == step_id)
    }

    /// Resolve a previously-labeled datapoint by its `data_labels` value,
    /// searching every step's recorded results for a matching label key.
    pub fn get_datapoint_id_by_label(&self, label: &str) -> Option<String> {
        self.get_all_datapoint_ids_by_label(label).into_iter().next()
    }

    pub fn get_all_datapoint_ids_by_label(&self, label: &str) -> Vec<String> {
        self.steps
            .iter()
            .filter(|step| step.definition.data_labels.values().any(|l| l == label))
            .flat_map(|step| step.results.keys().cloned())
            .collect()
    }
}
