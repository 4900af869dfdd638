// Crate-wide error type. One enum covers validation, routing, and backend
// failures so every layer - compiler, scheduler, dispatcher, API - can
// propagate with `?` and let the Ingress API map variants to HTTP statuses.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkcellError {
    /// A submitted workflow or workcell definition failed a structural
    /// check (unknown action, duplicate data label, dangling node/location
    /// reference) before ever reaching the scheduler.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The transfer graph has no path between the requested source and
    /// target locations.
    #[error("no transfer path from '{from}' to '{to}'")]
    NoTransferPath { from: String, to: String },

    /// A resource has no representation the requesting node understands
    /// (no `reference` entry for that node at the target location).
    #[error("location '{location}' has no representation for node '{node}'")]
    NoRepresentation { location: String, node: String },

    /// A node is not reachable or not ready when the dispatcher needs it.
    #[error("node '{0}' is unavailable")]
    NodeUnavailable(String),

    /// A step's terminal action result was `failed`.
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A storage or network operation failed in a way that may succeed on
    /// retry (NATS unreachable, connection reset, timeout).
    #[error("transient backend error: {0}")]
    TransientBackend(#[from] anyhow::Error),

    /// The advisory state lock could not be acquired within its deadline.
    #[error("timed out acquiring state lock for workcell '{0}'")]
    LockTimeout(String),

    /// A workflow or step was cancelled by an explicit user request rather
    /// than failing on its own.
    #[error("cancelled by user: {0}")]
    CancelledByUser(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for WorkcellError {
    fn from(err: std::io::Error) -> Self {
        WorkcellError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkcellError>;
