// Core domain models for the MADSci workcell engine.
// These are the JSON-serializable records the State Store persists and the
// API, Scheduler, and Dispatcher all operate on.

//! # Domain Models Module
//!
//! Contains the entities described in the workcell data model: the static
//! topology (`WorkcellDefinition`, `Node`, `Location`, `TransferTemplate`),
//! the submitted/materialized workflow types, and the action wire contract.
//!
//! ## Module Organization
//!
//! Each submodule owns one family of entities. `mod.rs` re-exports the
//! public surface so callers can write `use madsci_workcell_engine::models::Workflow`
//! instead of reaching into `models::workflow::Workflow`.

pub mod action;
pub mod ids;
pub mod location;
pub mod node;
pub mod ownership;
pub mod resource;
pub mod step;
pub mod transfer;
pub mod workcell;
pub mod workflow;

pub use action::{
    ActionArgumentDefinition, ActionDefinition, ActionFileDefinition, ActionRequest, ActionResult,
    ActionResultDefinition, ActionStatus,
};
pub use ids::{new_ulid, LocationId, NodeName, StepId, WorkflowId};
pub use location::{Location, LocationArgument, LocationDefinition, LocationReservation};
pub use node::{
    AdminCommand, AdminCommandResponse, Node, NodeCapabilities, NodeDefinition, NodeInfo,
    NodeReservation, NodeStatus,
};
pub use ownership::OwnershipInfo;
pub use resource::{Resource, ResourceDefinition};
pub use step::{Step, StepCondition, StepDefinition};
pub use transfer::{TransferTemplate, TRANSFER_ACTION_NAME};
pub use workcell::{WorkcellConfig, WorkcellDefinition, WorkcellState, WorkcellStatus};
pub use workflow::{
    SchedulerMetadata, Workflow, WorkflowDefinition, WorkflowMetadata, WorkflowParameter,
    WorkflowStatus,
};
