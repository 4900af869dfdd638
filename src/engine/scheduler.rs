// Scheduler: decides, on every tick, which queued workflow's next step is
// eligible to dispatch, and in what order.
//
// Priority is a pluggable function rather than a named strategy loaded by
// module path - the distilled source's scheduler let ops point at an
// arbitrary priority module; here it's an ordinary closure the embedder
// passes in, resolved once at startup (§9 open question, decided in
// DESIGN.md).

use std::collections::HashMap;

use crate::models::{Location, Node, StepCondition, Workflow};

/// `Fn(&Workflow) -> i64` - higher wins. The default breaks ties on
/// submission order (earlier submitted outranks later), so callers who
/// don't care about priority get plain FIFO.
pub type PriorityFn = Box<dyn Fn(&Workflow) -> i64 + Send + Sync>;

pub struct Scheduler {
    priority_fn: PriorityFn,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self { priority_fn: Box::new(fifo_priority) }
    }

    pub fn with_priority_fn(priority_fn: PriorityFn) -> Self {
        Self { priority_fn }
    }

    /// Is the step at `workflow`'s current index eligible to run right now?
    /// A workflow is ready when it's queued (not paused, not terminal, not
    /// already mid-step), its step's own node is ready for and unreserved by
    /// this workflow, and every `StepCondition` it declares is satisfied.
    pub fn is_ready(
        &self,
        workflow: &Workflow,
        nodes: &HashMap<String, Node>,
        locations: &HashMap<String, Location>,
    ) -> (bool, Vec<String>) {
        let mut reasons = Vec::new();
        if !workflow.status.queued() {
            reasons.push(format!("workflow is not queued: {}", workflow.status.description()));
            return (false, reasons);
        }
        let Some(step) = workflow.steps.get(workflow.status.current_step_index) else {
            reasons.push("no step at current index".to_string());
            return (false, reasons);
        };
        if step.status == crate::models::ActionStatus::Running {
            reasons.push("step is already dispatched and running".to_string());
            return (false, reasons);
        }
        let Some(node) = nodes.get(&step.definition.node) else {
            reasons.push(format!("node '{}' has no runtime record", step.definition.node));
            return (false, reasons);
        };
        if !node.ready_for(&workflow.ownership_info) {
            let why = node
                .status
                .as_ref()
                .map(|s| s.description())
                .unwrap_or_else(|| "node has never reported status".to_string());
            reasons.push(why);
            return (false, reasons);
        }

        for condition in &step.definition.conditions {
            match condition {
                StepCondition::NodeReady { node_name } => {
                    let Some(node) = nodes.get(node_name) else {
                        reasons.push(format!("node '{}' has no runtime record", node_name));
                        return (false, reasons);
                    };
                    if !node.ready_for(&workflow.ownership_info) {
                        reasons.push(format!("node '{}' is not ready", node_name));
                        return (false, reasons);
                    }
                }
                StepCondition::LocationFree { location_name } => {
                    let location = locations.values().find(|l| &l.location_name == location_name);
                    let Some(location) = location else {
                        reasons.push(format!("location '{}' has no runtime record", location_name));
                        return (false, reasons);
                    };
                    if !location.available_to(&workflow.ownership_info) {
                        reasons.push(format!("location '{}' is reserved", location_name));
                        return (false, reasons);
                    }
                }
            }
        }

        (true, reasons)
    }

    /// Among all workflows, pick the single highest-priority one whose
    /// current step is ready to dispatch. Ties break on earlier
    /// `submitted_time`.
    pub fn select_next<'a>(
        &self,
        workflows: &'a [Workflow],
        nodes: &HashMap<String, Node>,
        locations: &HashMap<String, Location>,
    ) -> Option<&'a Workflow> {
        workflows
            .iter()
            .filter(|wf| self.is_ready(wf, nodes, locations).0)
            .max_by(|a, b| {
                let pa = (self.priority_fn)(a);
                let pb = (self.priority_fn)(b);
                pa.cmp(&pb).then_with(|| b.submitted_time.cmp(&a.submitted_time))
            })
    }
}

fn fifo_priority(workflow: &Workflow) -> i64 {
    -workflow.submitted_time.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Node, NodeStatus, OwnershipInfo, Step, StepDefinition, Workflow, WorkflowDefinition,
        WorkflowMetadata,
    };
    use std::collections::HashMap;

    fn ready_node() -> Node {
        let mut node = Node::new("http://localhost");
        node.status = Some(NodeStatus::default());
        node
    }

    fn workflow_with_step(node_name: &str) -> Workflow {
        let def = WorkflowDefinition {
            name: "wf".into(),
            workflow_metadata: WorkflowMetadata::default(),
            parameters: Vec::new(),
            steps: vec![StepDefinition {
                name: "move".into(),
                step_id: crate::models::new_ulid(),
                description: None,
                action: "transfer".into(),
                node: node_name.into(),
                args: HashMap::new(),
                files: HashMap::new(),
                locations: HashMap::new(),
                data_labels: HashMap::new(),
                conditions: Vec::new(),
            }],
        };
        Workflow::from_definition(def, HashMap::new(), OwnershipInfo::new())
    }

    #[test]
    fn ready_workflow_with_ready_node_is_selected() {
        let scheduler = Scheduler::new();
        let wf = workflow_with_step("arm1");
        let mut nodes = HashMap::new();
        nodes.insert("arm1".to_string(), ready_node());
        let locations = HashMap::new();
        let (ready, _) = scheduler.is_ready(&wf, &nodes, &locations);
        assert!(ready);
        assert!(scheduler.select_next(std::slice::from_ref(&wf), &nodes, &locations).is_some());
    }

    #[test]
    fn paused_workflow_is_never_ready() {
        let scheduler = Scheduler::new();
        let mut wf = workflow_with_step("arm1");
        wf.status.paused = true;
        let mut nodes = HashMap::new();
        nodes.insert("arm1".to_string(), ready_node());
        assert!(!scheduler.is_ready(&wf, &nodes, &HashMap::new()).0);
    }

    #[test]
    fn missing_node_record_is_not_ready() {
        let scheduler = Scheduler::new();
        let wf = workflow_with_step("arm_missing");
        let nodes = HashMap::new();
        let (ready, reasons) = scheduler.is_ready(&wf, &nodes, &HashMap::new());
        assert!(!ready);
        assert!(!reasons.is_empty());
    }

    #[test]
    fn reserved_node_blocks_other_owners() {
        let scheduler = Scheduler::new();
        let wf = workflow_with_step("arm1");
        let mut node = ready_node();
        node.reserved_by = Some(crate::models::NodeReservation {
            owned_by: OwnershipInfo::for_workflow("someone-else"),
            created: chrono::Utc::now(),
            start: chrono::Utc::now() - chrono::Duration::seconds(1),
            end: chrono::Utc::now() + chrono::Duration::seconds(60),
        });
        let mut nodes = HashMap::new();
        nodes.insert("arm1".to_string(), node);
        assert!(!scheduler.is_ready(&wf, &nodes, &HashMap::new()).0);
    }

    #[test]
    fn unsatisfied_location_free_condition_blocks_dispatch() {
        let scheduler = Scheduler::new();
        let mut wf = workflow_with_step("arm1");
        wf.steps[0].definition.conditions.push(StepCondition::LocationFree { location_name: "bench".into() });
        let mut nodes = HashMap::new();
        nodes.insert("arm1".to_string(), ready_node());

        let mut locations = HashMap::new();
        locations.insert(
            "loc-1".to_string(),
            Location {
                location_id: "loc-1".into(),
                location_name: "bench".into(),
                reference: HashMap::new(),
                default_args: HashMap::new(),
                node_overrides: HashMap::new(),
                resource_id: None,
                reserved_by: Some(crate::models::LocationReservation {
                    owned_by: OwnershipInfo::for_workflow("someone-else"),
                    created: chrono::Utc::now(),
                    start: chrono::Utc::now() - chrono::Duration::seconds(1),
                    end: chrono::Utc::now() + chrono::Duration::seconds(60),
                }),
            },
        );
        assert!(!scheduler.is_ready(&wf, &nodes, &locations).0);
    }

    #[test]
    fn custom_priority_function_overrides_fifo() {
        let scheduler = Scheduler::with_priority_fn(Box::new(|wf: &Workflow| {
            if wf.name == "urgent" { 100 } else { 0 }
        }));
        let mut urgent = workflow_with_step("arm1");
        urgent.name = "urgent".into();
        let normal = workflow_with_step("arm1");
        let mut nodes = HashMap::new();
        nodes.insert("arm1".to_string(), ready_node());

        let batch = vec![normal, urgent];
        let selected = scheduler.select_next(&batch, &nodes, &HashMap::new()).unwrap();
        assert_eq!(selected.name, "urgent");
    }

    #[test]
    fn step_without_running_action_is_not_terminal_after_not_ready() {
        // Sanity check shared with step.rs: scheduler never advances
        // current_step_index itself, so a not_ready result leaves the
        // workflow queued for the next tick.
        let mut step = Step::from_definition(StepDefinition {
            name: "move".into(),
            step_id: crate::models::new_ulid(),
            description: None,
            action: "transfer".into(),
            node: "arm1".into(),
            args: HashMap::new(),
            files: HashMap::new(),
            locations: HashMap::new(),
            data_labels: HashMap::new(),
            conditions: Vec::new(),
        });
        let req = crate::models::ActionRequest::new("transfer");
        step.apply_result(req.not_ready(Vec::new()));
        assert!(!step.is_terminal());
    }
}
