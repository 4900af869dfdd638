// Ingress API handlers: the REST surface described in SPEC_FULL.md §6.1.
// Every handler is generic over the State Store and Node Client so the
// same router serves both the in-memory single-process deployment and the
// NATS-backed distributed one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, warn};

use crate::engine::dispatcher::NodeClient;
use crate::engine::node_http::parse_admin_command;
use crate::engine::state_store::WorkcellStateStore;
use crate::engine::workflow_manager::WorkflowManager;
use crate::engine::WorkflowCompiler;
use crate::error::{Result, WorkcellError};
use crate::models::{
    AdminCommandResponse, Location, LocationDefinition, Node, OwnershipInfo, Workflow,
    WorkflowDefinition,
};

use super::types::{
    AddLookupRequest, AttachResourceRequest, DeletedResponse, HealthResponse, LocationCreate,
    NodeRegistration, WorkcellStateResponse, WorkflowSubmissionForm,
};

/// Shared application state for the Ingress API. Cheap to clone: every
/// field is an `Arc`.
pub struct WorkcellApiState<S: WorkcellStateStore, C: NodeClient> {
    pub store: Arc<S>,
    pub node_client: Arc<C>,
    pub started_at: Instant,
}

impl<S: WorkcellStateStore, C: NodeClient> Clone for WorkcellApiState<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            node_client: self.node_client.clone(),
            started_at: self.started_at,
        }
    }
}

impl<S: WorkcellStateStore, C: NodeClient> WorkcellApiState<S, C> {
    pub fn new(store: Arc<S>, node_client: Arc<C>) -> Self {
        Self { store, node_client, started_at: Instant::now() }
    }
}

// ---------------------------------------------------------------------
// Workcell topology
// ---------------------------------------------------------------------

pub async fn get_definition<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<crate::models::WorkcellDefinition>> {
    let definition = state
        .store
        .get_workcell_definition()
        .await?
        .ok_or_else(|| WorkcellError::NotFound("workcell definition not set".to_string()))?;
    Ok(Json(definition))
}

pub async fn get_state<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<WorkcellStateResponse>> {
    let status = state.store.get_workcell_status().await?;
    let nodes = state.store.list_nodes().await?;
    let locations = state.store.list_locations().await?;
    let workcell = state.store.get_workcell_definition().await?;

    let mut active = state.store.list_active_workflows().await?;
    active.sort_by_key(|wf| wf.submitted_time);
    let queue = active.iter().map(|wf| wf.workflow_id.clone()).collect();

    let locked = nodes.values().any(|n| n.reserved_by.is_some());

    Ok(Json(WorkcellStateResponse {
        status,
        paused: status == crate::models::WorkcellStatus::Degraded,
        locked,
        queue,
        nodes,
        locations,
        workcell,
    }))
}

// ---------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------

pub async fn list_nodes<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<HashMap<String, Node>>> {
    Ok(Json(state.store.list_nodes().await?))
}

pub async fn get_node<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(name): Path<String>,
) -> Result<Json<Node>> {
    let node = state
        .store
        .get_node(&name)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("node '{name}' not found")))?;
    Ok(Json(node))
}

pub async fn register_node<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Json(body): Json<NodeRegistration>,
) -> Result<Json<Node>> {
    let node = Node::new(&body.node_url);
    state.store.set_node(&body.node_name, node.clone()).await?;
    info!(node = %body.node_name, permanent = body.permanent, "node registered");
    Ok(Json(node))
}

// ---------------------------------------------------------------------
// Admin commands
// ---------------------------------------------------------------------

pub async fn admin_all<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(command): Path<String>,
) -> Result<Json<HashMap<String, AdminCommandResponse>>> {
    let command = parse_admin_command(&command)
        .ok_or_else(|| WorkcellError::Validation(format!("unknown admin command '{command}'")))?;
    let nodes = state.store.list_nodes().await?;

    let mut responses = HashMap::new();
    for (name, node) in nodes {
        let response = match state.node_client.send_admin_command(&node.node_url, command).await {
            Ok(r) => r,
            Err(e) => {
                warn!(node = %name, error = %e, "admin command failed");
                AdminCommandResponse { success: false, errors: vec![e.to_string()] }
            }
        };
        responses.insert(name, response);
    }
    Ok(Json(responses))
}

pub async fn admin_one<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path((command, node_name)): Path<(String, String)>,
) -> Result<Json<AdminCommandResponse>> {
    let command = parse_admin_command(&command)
        .ok_or_else(|| WorkcellError::Validation(format!("unknown admin command '{command}'")))?;
    let node = state
        .store
        .get_node(&node_name)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("node '{node_name}' not found")))?;
    let response = state.node_client.send_admin_command(&node.node_url, command).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------

pub async fn list_active_workflows<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<HashMap<String, Workflow>>> {
    let workflows = state.store.list_active_workflows().await?;
    Ok(Json(workflows.into_iter().map(|wf| (wf.workflow_id.clone(), wf)).collect()))
}

#[derive(serde::Deserialize)]
pub struct ArchivedQuery {
    pub number: Option<usize>,
}

pub async fn list_archived_workflows<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Query(query): Query<ArchivedQuery>,
) -> Result<Json<HashMap<String, Workflow>>> {
    let mut workflows = state.store.list_archived_workflows().await?;
    workflows.sort_by_key(|wf| std::cmp::Reverse(wf.end_time));
    if let Some(n) = query.number {
        workflows.truncate(n);
    }
    Ok(Json(workflows.into_iter().map(|wf| (wf.workflow_id.clone(), wf)).collect()))
}

pub async fn workflow_queue<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<Vec<Workflow>>> {
    let mut workflows = state.store.list_active_workflows().await?;
    workflows.sort_by_key(|wf| wf.submitted_time);
    Ok(Json(workflows))
}

pub async fn get_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    if let Some(workflow) = state.store.get_workflow(&id).await? {
        return Ok(Json(workflow));
    }
    let workflow = state
        .store
        .get_archived_workflow(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("workflow '{id}' not found")))?;
    Ok(Json(workflow))
}

pub async fn pause_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    let manager = WorkflowManager::new(state.store.as_ref(), state.node_client.as_ref());
    Ok(Json(manager.pause(&id).await?))
}

pub async fn resume_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    let manager = WorkflowManager::new(state.store.as_ref(), state.node_client.as_ref());
    Ok(Json(manager.resume(&id).await?))
}

pub async fn cancel_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>> {
    let manager = WorkflowManager::new(state.store.as_ref(), state.node_client.as_ref());
    Ok(Json(manager.cancel(&id).await?))
}

#[derive(serde::Deserialize)]
pub struct RetryQuery {
    pub index: Option<usize>,
}

pub async fn retry_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<Workflow>> {
    let manager = WorkflowManager::new(state.store.as_ref(), state.node_client.as_ref());
    Ok(Json(manager.retry_from(&id, query.index.unwrap_or(0)).await?))
}

pub async fn create_workflow_definition<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<Json<serde_json::Value>> {
    definition.validate_unique_data_labels().map_err(WorkcellError::Validation)?;
    let id = crate::models::new_ulid();
    state.store.set_workflow_definition(&id, definition).await?;
    Ok(Json(serde_json::json!({ "workflow_definition_id": id })))
}

pub async fn get_workflow_definition<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDefinition>> {
    let definition = state
        .store
        .get_workflow_definition(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("workflow definition '{id}' not found")))?;
    Ok(Json(definition))
}

/// `POST /workflow`: parse the multipart submission, compile it against the
/// current topology, and enqueue it. Uploaded file parts are collected by
/// name but not persisted - registering them as datapoints is the Data
/// Manager collaborator's job (§6.2), out of scope here.
pub async fn submit_workflow<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    mut multipart: Multipart,
) -> Result<Json<Workflow>> {
    let mut form = WorkflowSubmissionForm::default();
    let mut uploaded_files: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WorkcellError::Validation(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else { continue };
        match name.as_str() {
            "definition_id" => {
                form.definition_id = field
                    .text()
                    .await
                    .map_err(|e| WorkcellError::Validation(e.to_string()))?;
            }
            "input_values" => {
                let text = field.text().await.map_err(|e| WorkcellError::Validation(e.to_string()))?;
                form.input_values = serde_json::from_str(&text)?;
            }
            "input_file_paths" => {
                let text = field.text().await.map_err(|e| WorkcellError::Validation(e.to_string()))?;
                form.input_file_paths = serde_json::from_str(&text)?;
            }
            "ownership_info" => {
                let text = field.text().await.map_err(|e| WorkcellError::Validation(e.to_string()))?;
                form.ownership_info = serde_json::from_str(&text)?;
            }
            "files" => {
                let file_name = field.file_name().unwrap_or(&name).to_string();
                uploaded_files.insert(name.clone(), file_name);
            }
            _ => {}
        }
    }

    if form.definition_id.is_empty() {
        return Err(WorkcellError::Validation("missing definition_id".to_string()));
    }

    let definition = state
        .store
        .get_workflow_definition(&form.definition_id)
        .await?
        .ok_or_else(|| {
            WorkcellError::NotFound(format!("workflow definition '{}' not found", form.definition_id))
        })?;

    let mut parameter_values = form.input_values;
    for (name, datapoint_id) in form.input_file_paths {
        parameter_values.insert(name, serde_json::json!(datapoint_id));
    }

    let workflow = WorkflowCompiler::compile(
        definition,
        parameter_values,
        form.ownership_info,
        state.store.as_ref(),
    )
    .await?;
    state.store.set_workflow(workflow.clone()).await?;
    Ok(Json(workflow))
}

// ---------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------

pub async fn list_locations<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> Result<Json<HashMap<String, Location>>> {
    Ok(Json(state.store.list_locations().await?))
}

pub async fn create_location<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Json(body): Json<LocationCreate>,
) -> Result<Json<Location>> {
    let definition = LocationDefinition {
        location_name: body.location_name,
        location_id: crate::models::new_ulid(),
        description: body.description,
        reference: body.reference,
        default_args: HashMap::new(),
        node_overrides: HashMap::new(),
        resource_definition: None,
    };
    let location = Location::from_definition(&definition);
    state.store.set_location(&location.location_id, location.clone()).await?;
    info!(location = %location.location_name, permanent = body.permanent, "location created");
    Ok(Json(location))
}

pub async fn get_location<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<Location>> {
    let location = state
        .store
        .get_location(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("location '{id}' not found")))?;
    Ok(Json(location))
}

pub async fn delete_location<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    state
        .store
        .get_location(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("location '{id}' not found")))?;
    state.store.delete_location(&id).await?;
    Ok(Json(DeletedResponse::new()))
}

pub async fn add_lookup<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path((id, node_name)): Path<(String, String)>,
    Json(body): Json<AddLookupRequest>,
) -> Result<Json<Location>> {
    let mut location = state
        .store
        .get_location(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("location '{id}' not found")))?;
    location.reference.insert(node_name, body.lookup_val);
    state.store.set_location(&id, location.clone()).await?;
    Ok(Json(location))
}

pub async fn attach_resource<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
    Path(id): Path<String>,
    Json(body): Json<AttachResourceRequest>,
) -> Result<Json<Location>> {
    let mut location = state
        .store
        .get_location(&id)
        .await?
        .ok_or_else(|| WorkcellError::NotFound(format!("location '{id}' not found")))?;
    location.resource_id = Some(body.resource_id);
    state.store.set_location(&id, location.clone()).await?;
    Ok(Json(location))
}

// ---------------------------------------------------------------------
// Ambient
// ---------------------------------------------------------------------

pub async fn health<S: WorkcellStateStore, C: NodeClient>(
    State(state): State<WorkcellApiState<S, C>>,
) -> impl IntoResponse {
    // A read that can't fail structurally (an empty map is a valid answer)
    // is enough to prove the state backend is actually reachable.
    let reachable = state.store.list_nodes().await.is_ok();
    Json(HealthResponse {
        status: if reachable { "ok" } else { "degraded" },
        service: "madsci-workcell-engine",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        state_store_reachable: reachable,
        state_version: state.store.state_version(),
    })
}

pub async fn not_found() -> impl IntoResponse {
    WorkcellError::NotFound("no such route".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dispatcher::mock::MockNodeClient;
    use crate::engine::state_store::InMemoryStateStore;

    fn state() -> WorkcellApiState<InMemoryStateStore, MockNodeClient> {
        WorkcellApiState::new(Arc::new(InMemoryStateStore::new()), Arc::new(MockNodeClient::default()))
    }

    #[tokio::test]
    async fn registering_a_node_makes_it_listable() {
        let st = state();
        register_node(
            State(st.clone()),
            Json(NodeRegistration { node_name: "arm1".into(), node_url: "http://localhost:9000".into(), permanent: false }),
        )
        .await
        .unwrap();

        let Json(nodes) = list_nodes(State(st)).await.unwrap();
        assert!(nodes.contains_key("arm1"));
    }

    #[tokio::test]
    async fn getting_an_unknown_node_is_not_found() {
        let st = state();
        let err = get_node(State(st), Path("missing".to_string())).await.unwrap_err();
        assert!(matches!(err, WorkcellError::NotFound(_)));
    }

    #[tokio::test]
    async fn creating_a_location_round_trips_through_get() {
        let st = state();
        let Json(created) = create_location(
            State(st.clone()),
            Json(LocationCreate {
                location_name: "bench".into(),
                description: None,
                reference: HashMap::new(),
                permanent: true,
            }),
        )
        .await
        .unwrap();

        let Json(fetched) = get_location(State(st), Path(created.location_id.clone())).await.unwrap();
        assert_eq!(fetched.location_name, "bench");
    }

    #[tokio::test]
    async fn health_reports_reachable_store() {
        let st = state();
        let response = health(State(st)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_command_with_unknown_name_is_rejected() {
        let st = state();
        let err = admin_all(State(st), Path("not-a-command".to_string())).await.unwrap_err();
        assert!(matches!(err, WorkcellError::Validation(_)));
    }
}
