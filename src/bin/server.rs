// MADSci Workcell Engine - server binary
// Run with: cargo run --bin server

//! Starts the Ingress API alongside the scheduler/dispatcher tick loop and
//! the node liveness poller, all sharing one State Store instance. The
//! backend (in-memory vs NATS JetStream) is selected by `storage_backend`
//! in `WorkcellSettings`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use madsci_workcell_engine::engine::{
    initialize_workcell_state, DistributedStateStore, DistributedStateStoreConfig, Engine,
    HttpNodeClient, HttpNodeProbe, HttpResourceManagerClient, InMemoryStateStore, NodePoller,
    Scheduler, WorkcellStateStore,
};
use madsci_workcell_engine::models::WorkcellDefinition;
use madsci_workcell_engine::{WorkcellServerBuilder, WorkcellSettings};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv() {
        eprintln!("no .env file loaded: {e}");
    }
    tracing_subscriber::fmt::init();

    let settings = WorkcellSettings::load()?;
    info!(backend = %settings.storage_backend, port = settings.server_port, "starting MADSci workcell engine");

    match settings.storage_backend.as_str() {
        "nats" => {
            let store = Arc::new(
                DistributedStateStore::connect(DistributedStateStoreConfig {
                    nats_urls: vec![settings.nats_url.clone()],
                    workcell_id: "default".to_string(),
                    connection_timeout: Duration::from_secs(10),
                })
                .await?,
            );
            run(store, settings).await
        }
        other => {
            if other != "memory" {
                warn!(backend = other, "unknown storage_backend, falling back to in-memory");
            }
            run(Arc::new(InMemoryStateStore::new()), settings).await
        }
    }
}

async fn run<S: WorkcellStateStore + 'static>(store: Arc<S>, settings: WorkcellSettings) -> anyhow::Result<()> {
    let resource_client = HttpResourceManagerClient::new(settings.resource_manager_url.clone(), Duration::from_secs(10));
    let node_urls = load_topology(&store, &resource_client, &settings).await?;

    let node_client = HttpNodeClient::default();
    let probe = HttpNodeProbe::default();

    let poller = NodePoller::new(probe, Duration::from_millis(settings.node_poll_interval_ms));
    let poller_store = store.clone();
    let poller_urls = node_urls.clone();
    tokio::spawn(async move {
        poller.run(poller_store.as_ref(), poller_urls).await;
    });

    let engine = Engine::new(
        store.clone(),
        Scheduler::new(),
        node_client.clone(),
        node_urls,
        Duration::from_millis(settings.scheduler_tick_ms),
    );
    tokio::spawn(async move {
        engine.spin().await;
    });

    let server = WorkcellServerBuilder::new(store, Arc::new(node_client))
        .with_host(settings.server_host.clone())
        .with_port(settings.server_port)
        .build();

    info!(host = %settings.server_host, port = settings.server_port, "Ingress API ready");
    server.run().await
}

/// Load the workcell definition from `workcell_definition_path` (if set),
/// delegate to `initialize_workcell_state` to apply it, and return the
/// node name -> URL map the poller and engine need. Starting with no
/// definition configured is valid - a topology can be built up entirely
/// through `POST /node` and `POST /location` instead, and the workcell
/// stays `Initializing` until an operator does.
async fn load_topology<S: WorkcellStateStore>(
    store: &Arc<S>,
    resource_client: &madsci_workcell_engine::engine::HttpResourceManagerClient,
    settings: &WorkcellSettings,
) -> anyhow::Result<HashMap<String, String>> {
    let Some(path) = &settings.workcell_definition_path else {
        return Ok(HashMap::new());
    };

    let raw = std::fs::read_to_string(path)?;
    let definition: WorkcellDefinition = serde_json::from_str(&raw)?;
    if let Err(e) = definition.validate_topology() {
        error!(error = %e, path, "workcell definition failed topology validation");
        return Err(anyhow::anyhow!(e));
    }

    let node_count = definition.nodes.len();
    let location_count = definition.locations.len();
    let node_urls = initialize_workcell_state(store.as_ref(), resource_client, definition).await?;

    info!(nodes = node_count, locations = location_count, "loaded workcell topology");
    Ok(node_urls)
}
