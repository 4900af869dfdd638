// End-to-end scenarios exercising the compiler -> scheduler -> dispatcher
// chain against an in-memory state store and a scripted node client, the
// same way spin.rs's own tests do but carried through to completion instead
// of a single tick. Scenario 3's compiler-level rejection is paired with
// api::types' own IntoResponse test, which covers the HTTP status mapping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use madsci_workcell_engine::engine::{Engine, InMemoryStateStore, NodeClient, Scheduler, WorkflowCompiler, WorkflowManager};
use madsci_workcell_engine::models::{
    ActionDefinition, ActionRequest, ActionResult, AdminCommand, AdminCommandResponse, LocationDefinition,
    Node, NodeCapabilities, NodeDefinition, NodeInfo, NodeStatus, OwnershipInfo, StepDefinition, TransferTemplate,
    WorkcellConfig, WorkcellDefinition, WorkflowDefinition, WorkflowMetadata, TRANSFER_ACTION_NAME,
};
use madsci_workcell_engine::{ActionStatus, Result, WorkcellError, WorkcellStateStore};

/// Scripted `NodeClient`: returns a canned `ActionResult` per action name
/// (defaulting to an immediate success) and records every admin command it
/// receives, so tests can assert on exactly what the engine sent.
#[derive(Default)]
struct TestNodeClient {
    responses: Mutex<HashMap<String, ActionResult>>,
    admin_commands: Mutex<Vec<AdminCommand>>,
}

impl TestNodeClient {
    fn respond_with(&self, action_name: &str, result: ActionResult) {
        self.responses.lock().unwrap().insert(action_name.to_string(), result);
    }
}

#[async_trait]
impl NodeClient for TestNodeClient {
    async fn send_action(&self, _node_url: &str, request: &ActionRequest) -> Result<ActionResult> {
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .get(&request.action_name)
            .cloned()
            .unwrap_or_else(|| request.succeeded(HashMap::new())))
    }

    async fn get_action_result(&self, _node_url: &str, action_id: &str) -> Result<ActionResult> {
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .values()
            .find(|r| r.action_id == action_id)
            .cloned()
            .unwrap_or(ActionResult {
                action_id: action_id.to_string(),
                status: ActionStatus::Running,
                errors: Vec::new(),
                data: HashMap::new(),
                files: HashMap::new(),
            }))
    }

    async fn send_admin_command(&self, _node_url: &str, command: AdminCommand) -> Result<AdminCommandResponse> {
        self.admin_commands.lock().unwrap().push(command);
        Ok(AdminCommandResponse { success: true, errors: Vec::new() })
    }
}

fn node_definition(name: &str) -> NodeDefinition {
    NodeDefinition {
        node_name: name.to_string(),
        node_id: madsci_workcell_engine::models::new_ulid(),
        node_url: None,
        node_description: None,
        module_name: None,
        module_version: None,
        capabilities: NodeCapabilities::default(),
        commands: HashMap::new(),
        config_defaults: HashMap::new(),
    }
}

fn ready_node(url: &str, action_names: &[&str]) -> Node {
    let mut actions = HashMap::new();
    for name in action_names {
        actions.insert(
            name.to_string(),
            ActionDefinition {
                name: name.to_string(),
                description: String::new(),
                args: HashMap::new(),
                files: HashMap::new(),
                results: HashMap::new(),
                blocking: false,
            },
        );
    }
    let info = NodeInfo { definition: node_definition(url), actions, config: HashMap::new(), config_schema: None };
    let mut node = Node::new(url);
    node.status = Some(NodeStatus::default());
    node.info = Some(info);
    node
}

fn location_definition(name: &str, id: &str, node_names: &[&str]) -> LocationDefinition {
    LocationDefinition {
        location_name: name.to_string(),
        location_id: id.to_string(),
        description: None,
        reference: node_names.iter().map(|n| (n.to_string(), serde_json::json!({"slot": 1}))).collect(),
        default_args: HashMap::new(),
        node_overrides: HashMap::new(),
        resource_definition: None,
    }
}

fn transfer_template(name: &str, node_name: &str) -> TransferTemplate {
    TransferTemplate {
        template_name: name.to_string(),
        node_name: node_name.to_string(),
        action_name: TRANSFER_ACTION_NAME.to_string(),
        source_arg_name: "source".to_string(),
        target_arg_name: "target".to_string(),
        cost_weight: 1.0,
        default_args: HashMap::new(),
    }
}

fn workcell(templates: Vec<TransferTemplate>) -> WorkcellDefinition {
    WorkcellDefinition {
        workcell_name: "test_cell".into(),
        description: None,
        nodes: HashMap::new(),
        locations: HashMap::new(),
        transfer_templates: templates,
        config: WorkcellConfig::default(),
    }
}

fn transfer_step(source: &str, target: &str) -> StepDefinition {
    let mut step = StepDefinition {
        name: "move".into(),
        step_id: madsci_workcell_engine::models::new_ulid(),
        description: None,
        action: TRANSFER_ACTION_NAME.into(),
        node: "unused".into(),
        args: HashMap::new(),
        files: HashMap::new(),
        locations: HashMap::new(),
        data_labels: HashMap::new(),
        conditions: Vec::new(),
    };
    step.locations.insert("source".into(), source.into());
    step.locations.insert("target".into(), target.into());
    step
}

fn simple_step(name: &str, node: &str, action: &str) -> StepDefinition {
    StepDefinition {
        name: name.into(),
        step_id: madsci_workcell_engine::models::new_ulid(),
        description: None,
        action: action.into(),
        node: node.into(),
        args: HashMap::new(),
        files: HashMap::new(),
        locations: HashMap::new(),
        data_labels: HashMap::new(),
        conditions: Vec::new(),
    }
}

async fn tick_until<S: WorkcellStateStore + 'static>(engine: &Engine<S, TestNodeClient>, max_ticks: usize) {
    for _ in 0..max_ticks {
        engine.tick().await.unwrap();
    }
}

#[tokio::test]
async fn direct_transfer_completes_in_one_hop() {
    let store = std::sync::Arc::new(InMemoryStateStore::new());
    store.set_node("arm1", ready_node("http://arm1", &[TRANSFER_ACTION_NAME])).await.unwrap();
    store.set_location("loc-1", madsci_workcell_engine::Location::from_definition(&location_definition("bench", "loc-1", &["arm1"]))).await.unwrap();
    store.set_location("loc-2", madsci_workcell_engine::Location::from_definition(&location_definition("incubator", "loc-2", &["arm1"]))).await.unwrap();
    store.set_workcell_definition(workcell(vec![transfer_template("arm1_move", "arm1")])).await.unwrap();

    let definition = WorkflowDefinition {
        name: "move_plate".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![transfer_step("bench", "incubator")],
    };
    let wf = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), store.as_ref())
        .await
        .unwrap();
    assert_eq!(wf.steps.len(), 1);
    let workflow_id = wf.workflow_id.clone();
    store.set_workflow(wf).await.unwrap();

    let mut node_urls = HashMap::new();
    node_urls.insert("arm1".to_string(), "http://arm1".to_string());
    let engine = Engine::new(store.clone(), Scheduler::new(), TestNodeClient::default(), node_urls, Duration::from_millis(10));

    tick_until(&engine, 1).await;

    let archived = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(archived.status.completed);
    assert_eq!(archived.steps.len(), 1);
    assert_eq!(archived.steps[0].status, ActionStatus::Succeeded);
}

#[tokio::test]
async fn two_hop_transfer_through_an_exchange_expands_and_completes() {
    let store = std::sync::Arc::new(InMemoryStateStore::new());
    store.set_node("arm1", ready_node("http://arm1", &[TRANSFER_ACTION_NAME])).await.unwrap();
    store.set_node("arm2", ready_node("http://arm2", &[TRANSFER_ACTION_NAME])).await.unwrap();
    store.set_location("l1", madsci_workcell_engine::Location::from_definition(&location_definition("l1", "l1", &["arm1"]))).await.unwrap();
    store.set_location("ex", madsci_workcell_engine::Location::from_definition(&location_definition("exchange", "ex", &["arm1", "arm2"]))).await.unwrap();
    store.set_location("l3", madsci_workcell_engine::Location::from_definition(&location_definition("l3", "l3", &["arm2"]))).await.unwrap();
    store
        .set_workcell_definition(workcell(vec![
            transfer_template("arm1_move", "arm1"),
            transfer_template("arm2_move", "arm2"),
        ]))
        .await
        .unwrap();

    let definition = WorkflowDefinition {
        name: "cross_cell_move".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![transfer_step("l1", "l3")],
    };
    let wf = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), store.as_ref())
        .await
        .unwrap();
    assert_eq!(wf.steps.len(), 2, "a two-hop route must expand to two concrete steps");
    assert_eq!(wf.steps[0].definition.node, "arm1");
    assert_eq!(wf.steps[1].definition.node, "arm2");
    let workflow_id = wf.workflow_id.clone();
    store.set_workflow(wf).await.unwrap();

    let mut node_urls = HashMap::new();
    node_urls.insert("arm1".to_string(), "http://arm1".to_string());
    node_urls.insert("arm2".to_string(), "http://arm2".to_string());
    let engine = Engine::new(store.clone(), Scheduler::new(), TestNodeClient::default(), node_urls, Duration::from_millis(10));

    tick_until(&engine, 2).await;

    let archived = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(archived.status.completed);
    assert_eq!(archived.status.current_step_index, 2);
}

#[tokio::test]
async fn locations_with_no_shared_node_fail_compilation_with_no_transfer_path() {
    let store = InMemoryStateStore::new();
    store.set_node("arm1", ready_node("http://arm1", &[TRANSFER_ACTION_NAME])).await.unwrap();
    store.set_node("arm_other", ready_node("http://arm_other", &[TRANSFER_ACTION_NAME])).await.unwrap();
    store.set_location("l1", madsci_workcell_engine::Location::from_definition(&location_definition("l1", "l1", &["arm1"]))).await.unwrap();
    store.set_location("isol", madsci_workcell_engine::Location::from_definition(&location_definition("isol", "isol", &["arm_other"]))).await.unwrap();
    store.set_workcell_definition(workcell(vec![transfer_template("arm1_move", "arm1")])).await.unwrap();

    let definition = WorkflowDefinition {
        name: "unreachable_move".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![transfer_step("l1", "isol")],
    };
    let result = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), &store).await;
    assert!(matches!(result, Err(WorkcellError::NoTransferPath { .. })));
    // A compilation failure never reaches the active workflow bucket.
    assert!(store.list_active_workflows().await.unwrap().is_empty());
}

#[tokio::test]
async fn an_unready_node_holds_the_workflow_queued_until_it_recovers() {
    let store = std::sync::Arc::new(InMemoryStateStore::new());
    let mut busy = ready_node("http://arm1", &["process"]);
    busy.status = Some(NodeStatus { busy: true, ..NodeStatus::default() });
    store.set_node("arm1", busy).await.unwrap();
    store.set_workcell_definition(workcell(Vec::new())).await.unwrap();

    let definition = WorkflowDefinition {
        name: "single_step".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![simple_step("run", "arm1", "process")],
    };
    let wf = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), store.as_ref())
        .await
        .unwrap();
    let workflow_id = wf.workflow_id.clone();
    store.set_workflow(wf).await.unwrap();

    let mut node_urls = HashMap::new();
    node_urls.insert("arm1".to_string(), "http://arm1".to_string());
    let engine = Engine::new(store.clone(), Scheduler::new(), TestNodeClient::default(), node_urls, Duration::from_millis(10));

    tick_until(&engine, 3).await;
    assert!(store.get_workflow(&workflow_id).await.unwrap().is_some(), "workflow must stay queued while the node is busy");
    assert!(store.get_archived_workflow(&workflow_id).await.unwrap().is_none());

    let mut node = store.get_node("arm1").await.unwrap().unwrap();
    node.status = Some(NodeStatus::default());
    store.set_node("arm1", node).await.unwrap();

    tick_until(&engine, 1).await;
    let archived = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(archived.status.completed);
}

#[tokio::test]
async fn cancelling_mid_run_notifies_the_active_node_and_archives_as_cancelled() {
    let store = std::sync::Arc::new(InMemoryStateStore::new());
    store.set_node("arm1", ready_node("http://arm1", &["step_a", "step_b", "step_c"])).await.unwrap();
    store.set_workcell_definition(workcell(Vec::new())).await.unwrap();

    let definition = WorkflowDefinition {
        name: "three_step".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![
            simple_step("a", "arm1", "step_a"),
            simple_step("b", "arm1", "step_b"),
            simple_step("c", "arm1", "step_c"),
        ],
    };
    let wf = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), store.as_ref())
        .await
        .unwrap();
    let workflow_id = wf.workflow_id.clone();
    store.set_workflow(wf).await.unwrap();

    let mut node_urls = HashMap::new();
    node_urls.insert("arm1".to_string(), "http://arm1".to_string());
    let client = TestNodeClient::default();
    let engine = Engine::new(store.clone(), Scheduler::new(), client, node_urls, Duration::from_millis(10));

    engine.tick().await.unwrap();
    let in_progress = store.get_workflow(&workflow_id).await.unwrap().unwrap();
    assert_eq!(in_progress.status.current_step_index, 1, "step a should have completed, advancing to step b");

    let cancel_client = TestNodeClient::default();
    let manager = WorkflowManager::new(store.as_ref(), &cancel_client);
    let cancelled = manager.cancel(&workflow_id).await.unwrap();
    assert!(cancelled.status.cancelled);
    assert!(cancelled.end_time.is_some());
    assert!(cancelled.status.current_step_index <= 2);
    assert_eq!(*cancel_client.admin_commands.lock().unwrap(), vec![AdminCommand::Cancel]);

    let archived = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(archived.status.cancelled);
}

#[tokio::test]
async fn retrying_from_a_failed_step_resumes_and_completes() {
    let store = std::sync::Arc::new(InMemoryStateStore::new());
    store.set_node("arm1", ready_node("http://arm1", &["step_a", "step_b", "step_c"])).await.unwrap();
    store.set_workcell_definition(workcell(Vec::new())).await.unwrap();

    let definition = WorkflowDefinition {
        name: "three_step".into(),
        workflow_metadata: WorkflowMetadata::default(),
        parameters: Vec::new(),
        steps: vec![
            simple_step("a", "arm1", "step_a"),
            simple_step("b", "arm1", "step_b"),
            simple_step("c", "arm1", "step_c"),
        ],
    };
    let wf = WorkflowCompiler::compile(definition, HashMap::new(), OwnershipInfo::new(), store.as_ref())
        .await
        .unwrap();
    let workflow_id = wf.workflow_id.clone();
    store.set_workflow(wf).await.unwrap();

    let mut node_urls = HashMap::new();
    node_urls.insert("arm1".to_string(), "http://arm1".to_string());
    let client = TestNodeClient::default();
    let fail_req = ActionRequest::new("step_b");
    client.respond_with("step_b", fail_req.failed(vec![madsci_workcell_engine::models::action::ActionError::new("jammed")]));
    let engine = Engine::new(store.clone(), Scheduler::new(), client, node_urls.clone(), Duration::from_millis(10));

    tick_until(&engine, 2).await;
    let failed = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(failed.status.failed);
    assert_eq!(failed.status.current_step_index, 1);
    assert!(!failed.steps[0].results.is_empty(), "step a's recorded result must survive the failure");

    let retry_client = TestNodeClient::default();
    let manager = WorkflowManager::new(store.as_ref(), &retry_client);
    let retried = manager.retry_from(&workflow_id, 1).await.unwrap();
    assert_eq!(retried.status.current_step_index, 1);
    assert!(!retried.status.terminal());
    assert_eq!(retried.steps[1].status, ActionStatus::NotStarted);
    assert_eq!(retried.steps[2].status, ActionStatus::NotStarted);
    assert!(!retried.steps[0].results.is_empty());

    let recovered_client = TestNodeClient::default();
    let engine = Engine::new(store.clone(), Scheduler::new(), recovered_client, node_urls, Duration::from_millis(10));
    tick_until(&engine, 2).await;

    let completed = store.get_archived_workflow(&workflow_id).await.unwrap().unwrap();
    assert!(completed.status.completed);
    assert_eq!(completed.status.current_step_index, 3);
}
