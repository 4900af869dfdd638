// Ingress API for the MADSci workcell engine.
//
// A thin, generic Axum surface over the engine: every handler is generic
// over the State Store and Node Client backing it, so the exact same
// router serves a single-process in-memory deployment or a NATS-backed
// distributed one without duplicating a line of routing logic.

pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::dispatcher::NodeClient;
use crate::engine::state_store::WorkcellStateStore;
use crate::engine::{HttpNodeClient, InMemoryStateStore};
use handlers::WorkcellApiState;

/// Ingress API server configuration.
#[derive(Clone, Debug)]
pub struct WorkcellServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for WorkcellServerConfig {
    fn default() -> Self {
        Self { port: 8000, host: "0.0.0.0".to_string(), cors_enabled: true }
    }
}

/// The Ingress API server: config plus the store/node-client pair every
/// handler is generic over.
pub struct WorkcellApiServer<S: WorkcellStateStore + 'static, C: NodeClient + 'static> {
    config: WorkcellServerConfig,
    state: WorkcellApiState<S, C>,
}

impl<S: WorkcellStateStore + 'static, C: NodeClient + 'static> WorkcellApiServer<S, C> {
    pub fn new(config: WorkcellServerConfig, store: Arc<S>, node_client: Arc<C>) -> Self {
        Self { config, state: WorkcellApiState::new(store, node_client) }
    }

    /// Assemble the full REST surface: topology, admin commands, workflow
    /// lifecycle, locations, and the ambient health endpoint.
    pub fn create_router(&self) -> Router {
        let app = Router::new()
            .route("/", get(handlers::get_definition::<S, C>))
            .route("/workcell", get(handlers::get_definition::<S, C>))
            .route("/definition", get(handlers::get_definition::<S, C>))
            .route("/state", get(handlers::get_state::<S, C>))
            .route("/nodes", get(handlers::list_nodes::<S, C>))
            .route("/node/:name", get(handlers::get_node::<S, C>))
            .route("/node", post(handlers::register_node::<S, C>))
            .route("/admin/:command", post(handlers::admin_all::<S, C>))
            .route("/admin/:command/:node", post(handlers::admin_one::<S, C>))
            .route("/workflows/active", get(handlers::list_active_workflows::<S, C>))
            .route("/workflows/archived", get(handlers::list_archived_workflows::<S, C>))
            .route("/workflows/queue", get(handlers::workflow_queue::<S, C>))
            .route("/workflow/:id", get(handlers::get_workflow::<S, C>))
            .route("/workflow/:id/pause", post(handlers::pause_workflow::<S, C>))
            .route("/workflow/:id/resume", post(handlers::resume_workflow::<S, C>))
            .route("/workflow/:id/cancel", post(handlers::cancel_workflow::<S, C>))
            .route("/workflow/:id/retry", post(handlers::retry_workflow::<S, C>))
            .route("/workflow_definition", post(handlers::create_workflow_definition::<S, C>))
            .route("/workflow_definition/:id", get(handlers::get_workflow_definition::<S, C>))
            .route("/workflow", post(handlers::submit_workflow::<S, C>))
            .route("/locations", get(handlers::list_locations::<S, C>))
            .route("/location", post(handlers::create_location::<S, C>))
            .route(
                "/location/:id",
                get(handlers::get_location::<S, C>).delete(handlers::delete_location::<S, C>),
            )
            .route("/location/:id/add_lookup/:node", post(handlers::add_lookup::<S, C>))
            .route("/location/:id/attach_resource", post(handlers::attach_resource::<S, C>))
            .route("/health", get(handlers::health::<S, C>))
            .fallback(handlers::not_found)
            .with_state(self.state.clone());

        if self.config.cors_enabled {
            app.layer(CorsLayer::permissive())
        } else {
            app
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let app = self.create_router();

        info!("MADSci workcell engine starting");
        info!(address = %addr, "Ingress API listening");

        axum::Server::bind(&addr.parse()?).serve(app.into_make_service()).await?;
        Ok(())
    }
}

/// Fluent builder mirroring the rest of this codebase's server-construction
/// idiom: defaults first, overrides chained, `build()` produces the server.
pub struct WorkcellServerBuilder<S: WorkcellStateStore + 'static, C: NodeClient + 'static> {
    config: WorkcellServerConfig,
    store: Arc<S>,
    node_client: Arc<C>,
}

impl<S: WorkcellStateStore + 'static, C: NodeClient + 'static> WorkcellServerBuilder<S, C> {
    pub fn new(store: Arc<S>, node_client: Arc<C>) -> Self {
        Self { config: WorkcellServerConfig::default(), store, node_client }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn build(self) -> WorkcellApiServer<S, C> {
        WorkcellApiServer::new(self.config, self.store, self.node_client)
    }
}

/// Convenience factory: single-process deployment, in-memory state store,
/// real HTTP node client. What `bin/server.rs` reaches for by default.
pub fn create_default_server() -> WorkcellApiServer<InMemoryStateStore, HttpNodeClient> {
    WorkcellServerBuilder::new(Arc::new(InMemoryStateStore::new()), Arc::new(HttpNodeClient::default()))
        .build()
}
