// Ingress API request/response types: the wire shapes the REST surface
// accepts and returns, distinct from the domain models they wrap or embed.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::WorkcellError;
use crate::models::{Location, Node, OwnershipInfo, WorkcellDefinition, WorkcellStatus};

/// `POST /node` body: register a node at a URL, optionally as a permanent
/// part of the topology rather than a session-only addition.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRegistration {
    pub node_name: String,
    pub node_url: String,
    #[serde(default)]
    pub permanent: bool,
}

/// `POST /location` body.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationCreate {
    pub location_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub permanent: bool,
}

/// `POST /location/{id}/add_lookup/{node}` body.
#[derive(Debug, Clone, Deserialize)]
pub struct AddLookupRequest {
    pub lookup_val: serde_json::Value,
}

/// `POST /location/{id}/attach_resource` body.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachResourceRequest {
    pub resource_id: String,
}

/// Parsed form of the `POST /workflow` multipart submission: the JSON
/// parts decoded, uploaded file bytes set aside for the Data Manager
/// collaborator (out of scope here; see DESIGN.md).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowSubmissionForm {
    pub definition_id: String,
    #[serde(default)]
    pub input_values: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub input_file_paths: HashMap<String, String>,
    #[serde(default)]
    pub ownership_info: OwnershipInfo,
}

/// `GET /state` response: the whole workcell at a glance.
#[derive(Debug, Clone, Serialize)]
pub struct WorkcellStateResponse {
    pub status: WorkcellStatus,
    pub paused: bool,
    pub locked: bool,
    pub queue: Vec<String>,
    pub nodes: HashMap<String, Node>,
    pub locations: HashMap<String, Location>,
    pub workcell: Option<WorkcellDefinition>,
}

/// `GET /health` response. Ambient endpoint, not part of the distilled
/// surface: reports whether the process and its state backend are alive,
/// independent of workcell-level status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub state_store_reachable: bool,
    pub state_version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub status: &'static str,
}

impl DeletedResponse {
    pub fn new() -> Self {
        Self { status: "deleted" }
    }
}

/// Maps every `WorkcellError` variant to the HTTP status a REST client
/// should see, mirroring the OpenAI-style error envelope this core was
/// grown from but without its chat-completion-specific fields.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for WorkcellError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkcellError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkcellError::NoTransferPath { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkcellError::NoRepresentation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkcellError::NodeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkcellError::StepFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkcellError::TransientBackend(_) => StatusCode::BAD_GATEWAY,
            WorkcellError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkcellError::CancelledByUser(_) => StatusCode::CONFLICT,
            WorkcellError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkcellError::Serialization(_) => StatusCode::BAD_REQUEST,
            WorkcellError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WorkcellError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ApiErrorBody {
            error: error_kind(&self).to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn error_kind(error: &WorkcellError) -> &'static str {
    match error {
        WorkcellError::Validation(_) => "validation_error",
        WorkcellError::NoTransferPath { .. } => "no_transfer_path",
        WorkcellError::NoRepresentation { .. } => "no_representation",
        WorkcellError::NodeUnavailable(_) => "node_unavailable",
        WorkcellError::StepFailed { .. } => "step_failed",
        WorkcellError::TransientBackend(_) => "transient_backend_error",
        WorkcellError::LockTimeout(_) => "lock_timeout",
        WorkcellError::CancelledByUser(_) => "cancelled_by_user",
        WorkcellError::NotFound(_) => "not_found",
        WorkcellError::Serialization(_) => "serialization_error",
        WorkcellError::Configuration(_) => "configuration_error",
        WorkcellError::Internal(_) => "internal_error",
    }
}
