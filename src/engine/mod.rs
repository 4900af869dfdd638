// Workcell Engine
// Execution engines: state storage, transfer planning, scheduling, and
// dispatch - the layer between the domain models and the external world.

//! # Engine Module
//!
//! The engine turns static topology and submitted workflows into
//! dispatched actions. Each submodule owns one concern:
//!
//! - [`state_store`] / [`distributed_state_store`]: where runtime state lives
//! - [`compiler`]: validates and materializes submitted workflows
//! - [`transfer_graph`]: plans multi-hop resource transfers
//! - [`scheduler`]: decides which ready step runs next
//! - [`dispatcher`]: issues action requests to nodes, idempotently
//! - [`node_poller`]: keeps node status fresh
//! - [`spin`]: the top-level loop tying scheduler and dispatcher together

pub mod compiler;
pub mod dispatcher;
pub mod distributed_state_store;
pub mod node_http;
pub mod node_poller;
pub mod resource_client;
pub mod scheduler;
pub mod spin;
pub mod state_store;
pub mod transfer_graph;
pub mod workflow_manager;

pub use compiler::WorkflowCompiler;
pub use dispatcher::{NodeClient, StepDispatcher};
pub use distributed_state_store::{DistributedStateStore, DistributedStateStoreConfig, BUCKET_NAME};
pub use node_http::{HttpNodeClient, HttpNodeProbe};
pub use node_poller::{NodePoller, NodeProbe};
pub use resource_client::{HttpResourceManagerClient, ResourceManagerClient};
pub use scheduler::{PriorityFn, Scheduler};
pub use spin::Engine;
pub use state_store::{initialize_workcell_state, InMemoryStateStore, StateGuard, WorkcellStateStore};
pub use transfer_graph::{TransferGraph, TransferHop, TransferPlan};
pub use workflow_manager::WorkflowManager;
