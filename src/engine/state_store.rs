// State Store abstraction and in-memory implementation.
//
// Everything the engine needs to remember - node/location runtime records,
// active and archived workflows - lives behind one trait so the scheduler,
// dispatcher, and API never care whether they're talking to an in-process
// map or a NATS-backed deployment (`distributed_state_store`).
//
// Key layout mirrors the bucket-per-entity-kind scheme the distilled
// source's Redis handler used: conceptually
// `madsci:workcell:{workcell_id}:{bucket}:{key}`, with `workcell_id` fixed
// per store instance rather than threaded through every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::{Result, WorkcellError};
use crate::models::{Location, Node, WorkcellDefinition, WorkcellStatus, Workflow, WorkflowDefinition};

use super::resource_client::ResourceManagerClient;

/// Held while a caller needs exclusive access to workcell state (e.g. the
/// scheduler's tick, or a pause/cancel transition). Each backend defines
/// its own guard type and release mechanism (dropping a reference for the
/// in-memory store, TTL expiry for the distributed one); callers only see
/// this marker trait.
pub trait StateGuard: Send {}

/// In-memory store's guard: released by clearing `lock_held_until` on drop.
pub struct InMemoryStateLock<'a> {
    store: &'a InMemoryStateStore,
}

impl<'a> StateGuard for InMemoryStateLock<'a> {}

impl<'a> Drop for InMemoryStateLock<'a> {
    fn drop(&mut self) {
        let mut held = self.store.lock_held_until.write().unwrap();
        *held = None;
    }
}

/// Storage abstraction for workcell runtime state.
///
/// ## Locking
/// `acquire_lock` grants advisory, TTL-bounded exclusivity: it does not
/// prevent a caller from ignoring it and writing anyway, but every engine
/// component that mutates shared state acquires it first (§5 Concurrency).
///
/// ## Change counter
/// `state_version` increases monotonically whenever `mark_state_changed`
/// is called, so callers (the Ingress API's long-poll endpoints) can cheaply
/// check "has anything happened since I last looked" without diffing.
#[async_trait::async_trait]
pub trait WorkcellStateStore: Send + Sync {
    async fn acquire_lock(&self, ttl: Duration) -> Result<Box<dyn StateGuard + '_>>;

    /// Workcell-wide static topology, set once at startup.
    async fn get_workcell_definition(&self) -> Result<Option<WorkcellDefinition>>;
    async fn set_workcell_definition(&self, definition: WorkcellDefinition) -> Result<()>;

    /// Workcell-wide runtime status, toggled by admin commands and startup.
    async fn get_workcell_status(&self) -> Result<WorkcellStatus>;
    async fn set_workcell_status(&self, status: WorkcellStatus) -> Result<()>;

    /// Submitted workflow definitions, kept by id so the Ingress API can
    /// materialize a run from a `definition_id` without the caller
    /// resubmitting the whole definition every time.
    async fn get_workflow_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>>;
    async fn set_workflow_definition(&self, id: &str, definition: WorkflowDefinition) -> Result<()>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>>;
    async fn set_node(&self, name: &str, node: Node) -> Result<()>;
    async fn list_nodes(&self) -> Result<HashMap<String, Node>>;
    async fn delete_node(&self, name: &str) -> Result<()>;

    async fn get_location(&self, id: &str) -> Result<Option<Location>>;
    async fn set_location(&self, id: &str, location: Location) -> Result<()>;
    async fn list_locations(&self) -> Result<HashMap<String, Location>>;
    async fn delete_location(&self, id: &str) -> Result<()>;

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;
    async fn set_workflow(&self, workflow: Workflow) -> Result<()>;
    async fn list_active_workflows(&self) -> Result<Vec<Workflow>>;

    /// Move a workflow from the active bucket to the archive bucket in one
    /// step. Called exactly once, when a workflow's status first becomes
    /// terminal (§4.G). Errors if the workflow isn't currently active.
    async fn archive_workflow(&self, workflow: Workflow) -> Result<()>;
    async fn get_archived_workflow(&self, id: &str) -> Result<Option<Workflow>>;
    async fn list_archived_workflows(&self) -> Result<Vec<Workflow>>;

    fn mark_state_changed(&self);
    fn state_version(&self) -> u64;
}

/// Default in-memory implementation: one process, one workcell, data lost
/// on restart. Used by tests and single-process deployments; the NATS
/// implementation in `distributed_state_store` is what production runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    workcell_definition: RwLock<Option<WorkcellDefinition>>,
    workcell_status: RwLock<WorkcellStatus>,
    workflow_definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    nodes: RwLock<HashMap<String, Node>>,
    locations: RwLock<HashMap<String, Location>>,
    active_workflows: RwLock<HashMap<String, Workflow>>,
    archived_workflows: RwLock<HashMap<String, Workflow>>,
    version: AtomicU64,
    lock_held_until: RwLock<Option<Instant>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WorkcellStateStore for InMemoryStateStore {
    async fn acquire_lock(&self, ttl: Duration) -> Result<Box<dyn StateGuard + '_>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let mut held = self.lock_held_until.write().unwrap();
                let expired = held.map(|until| Instant::now() >= until).unwrap_or(true);
                if expired {
                    *held = Some(Instant::now() + ttl);
                    return Ok(Box::new(InMemoryStateLock { store: self }));
                }
            }
            if Instant::now() >= deadline {
                return Err(WorkcellError::LockTimeout("workcell state".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn get_workcell_definition(&self) -> Result<Option<WorkcellDefinition>> {
        Ok(self.workcell_definition.read().unwrap().clone())
    }

    async fn set_workcell_definition(&self, definition: WorkcellDefinition) -> Result<()> {
        *self.workcell_definition.write().unwrap() = Some(definition);
        self.mark_state_changed();
        Ok(())
    }

    async fn get_workcell_status(&self) -> Result<WorkcellStatus> {
        Ok(*self.workcell_status.read().unwrap())
    }

    async fn set_workcell_status(&self, status: WorkcellStatus) -> Result<()> {
        *self.workcell_status.write().unwrap() = status;
        self.mark_state_changed();
        Ok(())
    }

    async fn get_workflow_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.workflow_definitions.read().unwrap().get(id).cloned())
    }

    async fn set_workflow_definition(&self, id: &str, definition: WorkflowDefinition) -> Result<()> {
        self.workflow_definitions.write().unwrap().insert(id.to_string(), definition);
        self.mark_state_changed();
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.nodes.read().unwrap().get(name).cloned())
    }

    async fn set_node(&self, name: &str, node: Node) -> Result<()> {
        self.nodes.write().unwrap().insert(name.to_string(), node);
        self.mark_state_changed();
        Ok(())
    }

    async fn list_nodes(&self) -> Result<HashMap<String, Node>> {
        Ok(self.nodes.read().unwrap().clone())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        self.nodes.write().unwrap().remove(name);
        self.mark_state_changed();
        Ok(())
    }

    async fn get_location(&self, id: &str) -> Result<Option<Location>> {
        Ok(self.locations.read().unwrap().get(id).cloned())
    }

    async fn set_location(&self, id: &str, location: Location) -> Result<()> {
        self.locations.write().unwrap().insert(id.to_string(), location);
        self.mark_state_changed();
        Ok(())
    }

    async fn list_locations(&self) -> Result<HashMap<String, Location>> {
        Ok(self.locations.read().unwrap().clone())
    }

    async fn delete_location(&self, id: &str) -> Result<()> {
        self.locations.write().unwrap().remove(id);
        self.mark_state_changed();
        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.active_workflows.read().unwrap().get(id).cloned())
    }

    async fn set_workflow(&self, workflow: Workflow) -> Result<()> {
        self.active_workflows
            .write()
            .unwrap()
            .insert(workflow.workflow_id.clone(), workflow);
        self.mark_state_changed();
        Ok(())
    }

    async fn list_active_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self.active_workflows.read().unwrap().values().cloned().collect())
    }

    async fn archive_workflow(&self, workflow: Workflow) -> Result<()> {
        let id = workflow.workflow_id.clone();
        let mut active = self.active_workflows.write().unwrap();
        if active.remove(&id).is_none() {
            return Err(WorkcellError::NotFound(format!(
                "workflow '{id}' is not active"
            )));
        }
        drop(active);
        self.archived_workflows.write().unwrap().insert(id, workflow);
        self.mark_state_changed();
        Ok(())
    }

    async fn get_archived_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.archived_workflows.read().unwrap().get(id).cloned())
    }

    async fn list_archived_workflows(&self) -> Result<Vec<Workflow>> {
        Ok(self.archived_workflows.read().unwrap().values().cloned().collect())
    }

    fn mark_state_changed(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn state_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Atomically (re)load a workcell's topology into the store: §4.A's init
/// procedure. Not a trait method - it drives a `ResourceManagerClient` too,
/// and a generic method on `WorkcellStateStore` would make the trait
/// non-object-safe, breaking every `&dyn WorkcellStateStore` call site the
/// compiler and API handlers already depend on.
///
/// Nodes are replaced wholesale (the old set is cleared first, since a node
/// dropped from the new definition shouldn't linger as a stale runtime
/// record). Locations are merged by id instead: an existing location keeps
/// its `resource_id` and `reserved_by` state, since those are runtime facts
/// the new definition doesn't know about. A location whose definition
/// embeds a `resource_definition` and has no `resource_id` yet gets one
/// created via `resource_client` before its record is written back.
pub async fn initialize_workcell_state(
    store: &dyn WorkcellStateStore,
    resource_client: &dyn ResourceManagerClient,
    definition: WorkcellDefinition,
) -> Result<HashMap<String, String>> {
    definition.validate_topology().map_err(WorkcellError::Configuration)?;

    for name in store.list_nodes().await?.into_keys() {
        store.delete_node(&name).await?;
    }

    let mut node_urls = HashMap::new();
    for (name, node_def) in &definition.nodes {
        if let Some(url) = &node_def.node_url {
            node_urls.insert(name.clone(), url.clone());
            store.set_node(name, Node::new(url.clone())).await?;
        }
    }

    for (id, location_def) in &definition.locations {
        let mut location = store
            .get_location(id)
            .await?
            .unwrap_or_else(|| Location::from_definition(location_def));
        location.location_name = location_def.location_name.clone();
        location.reference = location_def.reference.clone();
        location.default_args = location_def.default_args.clone();
        location.node_overrides = location_def.node_overrides.clone();

        if location.resource_id.is_none() {
            if let Some(resource_def) = &location_def.resource_definition {
                let resource = resource_client.add_resource(resource_def).await?;
                location.resource_id = Some(resource.resource_id);
            }
        }
        store.set_location(id, location).await?;
    }

    store.set_workcell_definition(definition).await?;
    store.set_workcell_status(WorkcellStatus::Ready).await?;
    store.mark_state_changed();
    Ok(node_urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::resource_client::mock::MockResourceManagerClient;
    use crate::models::OwnershipInfo;
    use crate::models::{
        LocationDefinition, NodeDefinition, ResourceDefinition, Workflow, WorkflowDefinition,
        WorkflowMetadata,
    };

    fn sample_workflow() -> Workflow {
        Workflow::from_definition(
            WorkflowDefinition {
                name: "assay".into(),
                workflow_metadata: WorkflowMetadata::default(),
                parameters: Vec::new(),
                steps: Vec::new(),
            },
            HashMap::new(),
            OwnershipInfo::new(),
        )
    }

    #[tokio::test]
    async fn workcell_status_defaults_to_initializing() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get_workcell_status().await.unwrap(), crate::models::WorkcellStatus::Initializing);
        store.set_workcell_status(crate::models::WorkcellStatus::Ready).await.unwrap();
        assert_eq!(store.get_workcell_status().await.unwrap(), crate::models::WorkcellStatus::Ready);
    }

    #[tokio::test]
    async fn set_then_get_workflow_round_trips() {
        let store = InMemoryStateStore::new();
        let wf = sample_workflow();
        let id = wf.workflow_id.clone();
        store.set_workflow(wf).await.unwrap();
        let fetched = store.get_workflow(&id).await.unwrap();
        assert_eq!(fetched.unwrap().workflow_id, id);
    }

    #[tokio::test]
    async fn archiving_moves_workflow_out_of_active_list() {
        let store = InMemoryStateStore::new();
        let wf = sample_workflow();
        let id = wf.workflow_id.clone();
        store.set_workflow(wf.clone()).await.unwrap();
        store.archive_workflow(wf).await.unwrap();

        assert!(store.get_workflow(&id).await.unwrap().is_none());
        assert!(store.get_archived_workflow(&id).await.unwrap().is_some());
        assert!(store.list_active_workflows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archiving_a_workflow_twice_fails() {
        let store = InMemoryStateStore::new();
        let wf = sample_workflow();
        store.set_workflow(wf.clone()).await.unwrap();
        store.archive_workflow(wf.clone()).await.unwrap();
        assert!(store.archive_workflow(wf).await.is_err());
    }

    #[tokio::test]
    async fn mark_state_changed_advances_version() {
        let store = InMemoryStateStore::new();
        let before = store.state_version();
        store.mark_state_changed();
        assert_eq!(store.state_version(), before + 1);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_dropped() {
        let store = InMemoryStateStore::new();
        let guard = store.acquire_lock(Duration::from_millis(50)).await.unwrap();
        drop(guard);
        // Should be immediately reacquirable once dropped.
        let _guard2 = store.acquire_lock(Duration::from_millis(50)).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_node_removes_it_from_the_list() {
        let store = InMemoryStateStore::new();
        store.set_node("arm1", crate::models::Node::new("http://localhost:9000")).await.unwrap();
        store.delete_node("arm1").await.unwrap();
        assert!(store.list_nodes().await.unwrap().is_empty());
    }

    fn workcell_with_resource_backed_location() -> WorkcellDefinition {
        let mut nodes = HashMap::new();
        nodes.insert(
            "arm1".to_string(),
            NodeDefinition {
                node_name: "arm1".into(),
                node_id: "node-1".into(),
                node_url: Some("http://localhost:9000".into()),
                node_description: None,
                module_name: None,
                module_version: None,
                capabilities: Default::default(),
                commands: HashMap::new(),
                config_defaults: HashMap::new(),
            },
        );
        let mut locations = HashMap::new();
        locations.insert(
            "loc-1".to_string(),
            LocationDefinition {
                location_name: "bench".into(),
                location_id: "loc-1".into(),
                description: None,
                reference: HashMap::from([("arm1".to_string(), serde_json::json!({"slot": 1}))]),
                default_args: HashMap::new(),
                node_overrides: HashMap::new(),
                resource_definition: Some(ResourceDefinition {
                    resource_name: "bench_plate".into(),
                    resource_type: "plate".into(),
                    attributes: HashMap::new(),
                }),
            },
        );
        WorkcellDefinition {
            workcell_name: "test_cell".into(),
            description: None,
            nodes,
            locations,
            transfer_templates: Vec::new(),
            config: Default::default(),
        }
    }

    #[tokio::test]
    async fn initializing_creates_nodes_and_a_resource_for_the_location() {
        let store = InMemoryStateStore::new();
        let resource_client = MockResourceManagerClient::default();
        let node_urls = initialize_workcell_state(&store, &resource_client, workcell_with_resource_backed_location())
            .await
            .unwrap();

        assert_eq!(node_urls.get("arm1").unwrap(), "http://localhost:9000");
        assert!(store.get_node("arm1").await.unwrap().is_some());
        let location = store.get_location("loc-1").await.unwrap().unwrap();
        assert_eq!(location.resource_id.as_deref(), Some("resource-1"));
        assert_eq!(resource_client.created.lock().unwrap().len(), 1);
        assert_eq!(store.get_workcell_status().await.unwrap(), WorkcellStatus::Ready);
    }

    #[tokio::test]
    async fn reinitializing_does_not_recreate_an_existing_resource() {
        let store = InMemoryStateStore::new();
        let resource_client = MockResourceManagerClient::default();
        initialize_workcell_state(&store, &resource_client, workcell_with_resource_backed_location())
            .await
            .unwrap();
        initialize_workcell_state(&store, &resource_client, workcell_with_resource_backed_location())
            .await
            .unwrap();

        assert_eq!(resource_client.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn initializing_clears_nodes_no_longer_in_the_definition() {
        let store = InMemoryStateStore::new();
        store.set_node("stale", crate::models::Node::new("http://localhost:1")).await.unwrap();
        let resource_client = MockResourceManagerClient::default();
        initialize_workcell_state(&store, &resource_client, workcell_with_resource_backed_location())
            .await
            .unwrap();
        assert!(store.get_node("stale").await.unwrap().is_none());
    }
}
