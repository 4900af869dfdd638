// MADSci Workcell Engine - Rust Edition
// A workcell orchestration engine: compiles submitted workflows against a
// lab's topology, schedules them against node/location availability, and
// dispatches actions to nodes over HTTP.

//! # Workcell Engine Library
//!
//! This is the main library crate for the workcell engine. It turns a
//! static lab topology (nodes, locations, transfer templates) and a stream
//! of submitted workflows into dispatched actions, tracking every run's
//! state through to completion.
//!
//! ## Core Components
//!
//! ### Domain Models ([`models`])
//! - [`WorkcellDefinition`]: the static topology - nodes, locations, transfer templates
//! - [`WorkflowDefinition`] / [`Workflow`]: submitted spec vs. materialized run
//! - [`Node`] / [`Location`]: runtime records refreshed by the liveness poller
//! - [`ActionRequest`] / [`ActionResult`]: the wire contract with nodes
//!
//! ### Engine ([`engine`])
//! - [`WorkcellStateStore`]: advisory-locked, versioned state, backed by an
//!   in-memory or NATS JetStream implementation
//! - [`TransferGraph`]: Dijkstra over transfer templates to route resources
//!   between locations
//! - [`Scheduler`]: decides which ready step runs next
//! - [`StepDispatcher`]: issues idempotent action requests to nodes
//! - [`WorkflowManager`]: pause/resume/cancel/retry and archival
//!
//! ### Ingress API ([`api`])
//! REST surface for submitting workflows and querying workcell/workflow state.
//!
//! ## Module System
//!
//! `pub mod` makes a module accessible to external crates; `pub use`
//! re-exports flatten the surface so callers can write
//! `madsci_workcell_engine::Workflow` instead of
//! `madsci_workcell_engine::models::workflow::Workflow`.

// Core domain models (language-agnostic)
// The `pub` keyword makes this module accessible to external crates
pub mod models;

// Crate-wide error type and Result alias
pub mod error;

// Layered settings (file + environment)
pub mod config;

// Engine implementations (state store, scheduler, dispatcher, transfer graph)
pub mod engine;

// Ingress API (REST)
pub mod api;

// Re-export core domain types for easy access
// This creates a "flat" API - users can import directly from the crate root
// instead of navigating the module hierarchy
pub use models::{
    ActionDefinition,
    ActionRequest,
    ActionResult,
    ActionStatus,
    Location,
    LocationDefinition,
    Node,
    NodeDefinition,
    NodeStatus,
    OwnershipInfo,
    Step,
    StepDefinition,
    TransferTemplate,
    WorkcellDefinition,
    Workflow,
    WorkflowDefinition,
    WorkflowStatus,
};

pub use error::{Result, WorkcellError};
pub use config::WorkcellSettings;

// Re-export engine types for convenience
pub use engine::{
    dispatcher::{NodeClient, StepDispatcher},
    scheduler::Scheduler,
    state_store::{InMemoryStateStore, WorkcellStateStore},
    transfer_graph::TransferGraph,
    workflow_manager::WorkflowManager,
};

// Re-export API types for convenience
pub use api::{WorkcellApiServer, WorkcellServerBuilder, WorkcellServerConfig};
