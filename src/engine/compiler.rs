// Workflow Compiler: turns a submitted WorkflowDefinition into a
// materialized Workflow, rejecting anything that can't possibly run before
// it ever reaches the scheduler (§4.D).
//
// Compilation runs in five passes, each over the output of the last:
//   1. reject duplicate data labels across the whole submitted definition.
//   2. bind parameters, substituting every `${name}` placeholder in step
//      args with its resolved value.
//   3. expand each transfer step into one concrete step per hop of its
//      Transfer Graph route (a direct transfer expands to one hop).
//   4. merge each step's args: template defaults, then the source and
//      destination locations' defaults, then their per-node overrides,
//      then whatever the caller supplied - later sources win.
//   5. validate every resulting step against the node's advertised action
//      (required args/files present and type-correct) and resolve its
//      `locations` map into concrete `LocationArgument` values.
//
// Neither the scheduler nor the dispatcher ever sees an unresolved
// placeholder, an unexpanded transfer step, or an unresolved location
// reference again after this runs.

use std::collections::HashMap;

use crate::models::location::LocationArgument;
use crate::models::{
    ActionDefinition, Location, OwnershipInfo, StepCondition, StepDefinition, TransferTemplate,
    Workflow, WorkflowDefinition, TRANSFER_ACTION_NAME,
};

use crate::error::{Result, WorkcellError};

use super::state_store::WorkcellStateStore;
use super::transfer_graph::TransferGraph;

pub struct WorkflowCompiler;

impl WorkflowCompiler {
    pub async fn compile(
        definition: WorkflowDefinition,
        parameter_values: HashMap<String, serde_json::Value>,
        ownership_info: OwnershipInfo,
        store: &dyn WorkcellStateStore,
    ) -> Result<Workflow> {
        definition
            .validate_unique_data_labels()
            .map_err(WorkcellError::Validation)?;

        let resolved_params = Self::resolve_parameters(&definition, &parameter_values)?;
        let mut definition = Self::substitute_args(definition, &resolved_params);

        let workcell = store
            .get_workcell_definition()
            .await?
            .ok_or_else(|| WorkcellError::Configuration("workcell has no topology loaded".into()))?;
        let locations = store.list_locations().await?;
        let locations_by_name: HashMap<String, String> = locations
            .values()
            .map(|loc| (loc.location_name.clone(), loc.location_id.clone()))
            .collect();
        let graph = TransferGraph::build(&locations, &workcell.transfer_templates);

        let mut expanded_steps = Vec::new();
        for step in definition.steps.drain(..) {
            if step.action == TRANSFER_ACTION_NAME {
                expanded_steps.extend(Self::expand_transfer_step(&step, &graph, &locations_by_name)?);
            } else {
                expanded_steps.push(step);
            }
        }
        definition.steps = expanded_steps;

        for step in &mut definition.steps {
            Self::merge_step_args(step, &locations, &locations_by_name, &workcell.transfer_templates);
        }

        for step in &mut definition.steps {
            let node = store
                .get_node(&step.node)
                .await?
                .ok_or_else(|| WorkcellError::Validation(format!("unknown node '{}'", step.node)))?;
            let info = node
                .info
                .as_ref()
                .ok_or_else(|| WorkcellError::NodeUnavailable(step.node.clone()))?;
            let action = info.actions.get(&step.action).ok_or_else(|| {
                WorkcellError::Validation(format!(
                    "node '{}' does not advertise action '{}' used by step '{}'",
                    step.node, step.action, step.name
                ))
            })?;

            Self::validate_action_args(step, action)?;
            Self::resolve_locations(step, &locations, &locations_by_name)?;
        }

        Ok(Workflow::from_definition(definition, resolved_params, ownership_info))
    }

    fn resolve_parameters(
        definition: &WorkflowDefinition,
        provided: &HashMap<String, serde_json::Value>,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let mut resolved = HashMap::new();
        for parameter in &definition.parameters {
            let value = provided
                .get(&parameter.name)
                .cloned()
                .or_else(|| parameter.default.clone())
                .ok_or_else(|| {
                    WorkcellError::Validation(format!(
                        "missing required parameter '{}'",
                        parameter.name
                    ))
                })?;
            resolved.insert(parameter.name.clone(), value);
        }
        Ok(resolved)
    }

    /// Rewrite every step's string args of the form `${name}` into the
    /// resolved parameter value. Non-placeholder args pass through
    /// untouched.
    fn substitute_args(
        mut definition: WorkflowDefinition,
        params: &HashMap<String, serde_json::Value>,
    ) -> WorkflowDefinition {
        for step in &mut definition.steps {
            for value in step.args.values_mut() {
                if let Some(name) = as_placeholder(value) {
                    if let Some(resolved) = params.get(name) {
                        *value = resolved.clone();
                    }
                }
            }
        }
        definition
    }

    /// A transfer step names a source and a destination location under the
    /// canonical keys `source`/`target` rather than a fixed node - the
    /// Transfer Graph decides which node (or chain of nodes) actually moves
    /// the resource. Expands to one concrete step per hop; a same-location
    /// request expands to zero steps.
    fn expand_transfer_step(
        step: &StepDefinition,
        graph: &TransferGraph,
        locations_by_name: &HashMap<String, String>,
    ) -> Result<Vec<StepDefinition>> {
        let source_name = step.locations.get("source").ok_or_else(|| {
            WorkcellError::Validation(format!("transfer step '{}' is missing a 'source' location", step.name))
        })?;
        let target_name = step.locations.get("target").ok_or_else(|| {
            WorkcellError::Validation(format!("transfer step '{}' is missing a 'target' location", step.name))
        })?;
        let source_id = locations_by_name.get(source_name).ok_or_else(|| {
            WorkcellError::Validation(format!("transfer step '{}' names unknown location '{}'", step.name, source_name))
        })?;
        let target_id = locations_by_name.get(target_name).ok_or_else(|| {
            WorkcellError::Validation(format!("transfer step '{}' names unknown location '{}'", step.name, target_name))
        })?;

        let plan = graph.plan(source_id, target_id)?;
        let hop_count = plan.hops.len();
        let mut steps = Vec::with_capacity(hop_count);
        for (i, hop) in plan.hops.into_iter().enumerate() {
            let is_last = i + 1 == hop_count;
            let mut locations = HashMap::new();
            locations.insert(hop.source_arg_name.clone(), hop.from_location.clone());
            locations.insert(hop.target_arg_name.clone(), hop.to_location.clone());

            steps.push(StepDefinition {
                name: format!("{}_hop_{}", step.name, i + 1),
                step_id: crate::models::new_ulid(),
                description: step.description.clone(),
                action: hop.action_name.clone(),
                node: hop.node_name.clone(),
                args: step.args.clone(),
                files: step.files.clone(),
                locations,
                data_labels: if is_last { step.data_labels.clone() } else { HashMap::new() },
                conditions: vec![StepCondition::NodeReady { node_name: hop.node_name.clone() }],
            });
        }
        Ok(steps)
    }

    /// Folds template/location default args into a step's own args, in
    /// ascending precedence: template defaults, source location defaults,
    /// destination location defaults, source location per-node overrides,
    /// destination location per-node overrides, then the caller's own args
    /// last so nothing a caller explicitly set is ever overwritten.
    fn merge_step_args(
        step: &mut StepDefinition,
        locations: &HashMap<String, Location>,
        locations_by_name: &HashMap<String, String>,
        templates: &[TransferTemplate],
    ) {
        if step.locations.len() != 2 {
            return;
        }

        let template = templates.iter().find(|t| t.node_name == step.node && t.action_name == step.action);
        let mut merged = HashMap::new();
        if let Some(template) = template {
            merged.extend(template.default_args.clone());
        }

        let located: Vec<&Location> = step
            .locations
            .values()
            .filter_map(|name_or_id| {
                locations
                    .get(name_or_id)
                    .or_else(|| locations_by_name.get(name_or_id).and_then(|id| locations.get(id)))
            })
            .collect();
        for location in &located {
            merged.extend(location.default_args.clone());
        }
        for location in &located {
            if let Some(overrides) = location.node_overrides.get(&step.node) {
                merged.extend(overrides.clone());
            }
        }

        merged.extend(step.args.clone());
        step.args = merged;
    }

    fn validate_action_args(step: &StepDefinition, action: &ActionDefinition) -> Result<()> {
        for (arg_name, arg_def) in &action.args {
            if !arg_def.required {
                continue;
            }
            let value = step.args.get(arg_name).or(arg_def.default.as_ref()).ok_or_else(|| {
                WorkcellError::Validation(format!(
                    "step '{}' is missing required arg '{}' for action '{}'",
                    step.name, arg_name, step.action
                ))
            })?;
            if !value_matches_type(value, &arg_def.arg_type) {
                return Err(WorkcellError::Validation(format!(
                    "step '{}' arg '{}' does not match declared type '{}'",
                    step.name, arg_name, arg_def.arg_type
                )));
            }
        }
        for (file_name, file_def) in &action.files {
            if file_def.required && !step.files.contains_key(file_name) {
                return Err(WorkcellError::Validation(format!(
                    "step '{}' is missing required file '{}' for action '{}'",
                    step.name, file_name, step.action
                )));
            }
        }
        Ok(())
    }

    /// Resolve each `step.locations` entry (arg name -> location name) into
    /// a concrete `LocationArgument` keyed to whatever representation
    /// `step.node` carries for that location, written into `step.args`.
    fn resolve_locations(
        step: &mut StepDefinition,
        locations: &HashMap<String, Location>,
        locations_by_name: &HashMap<String, String>,
    ) -> Result<()> {
        for (arg_name, location_name) in step.locations.clone() {
            let location = locations_by_name
                .get(&location_name)
                .and_then(|id| locations.get(id))
                .or_else(|| locations.get(&location_name))
                .ok_or_else(|| WorkcellError::Validation(format!("unknown location '{}'", location_name)))?;

            let reference = location.reference.get(&step.node).ok_or_else(|| WorkcellError::NoRepresentation {
                location: location.location_name.clone(),
                node: step.node.clone(),
            })?;

            let resolved = LocationArgument { location_name: location.location_name.clone(), argument: reference.clone() };
            step.args.insert(arg_name, serde_json::to_value(resolved)?);
        }
        Ok(())
    }
}

fn value_matches_type(value: &serde_json::Value, arg_type: &str) -> bool {
    match arg_type {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn as_placeholder(value: &serde_json::Value) -> Option<&str> {
    let s = value.as_str()?;
    s.strip_prefix("${")?.strip_suffix('}')
}
