// HTTP-backed implementations of the dispatcher's `NodeClient` and the
// poller's `NodeProbe`, for talking to a real node over the wire. Nodes are
// expected to expose `POST /action`, `GET /action/{id}`, `GET /info`,
// `GET /status`, and `POST /admin/{command}` - the REST shape the
// distilled source's node drivers also speak.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, WorkcellError};
use crate::models::{
    ActionRequest, ActionResult, AdminCommand, AdminCommandResponse, NodeInfo, NodeStatus,
};

use super::dispatcher::NodeClient;
use super::node_poller::NodeProbe;

#[derive(Clone)]
pub struct HttpNodeClient {
    client: Client,
}

impl HttpNodeClient {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build node HTTP client");
        Self { client }
    }
}

impl Default for HttpNodeClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn transport_error(node_url: &str, err: reqwest::Error) -> WorkcellError {
    WorkcellError::NodeUnavailable(format!("{node_url}: {err}"))
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn send_action(&self, node_url: &str, request: &ActionRequest) -> Result<ActionResult> {
        let url = format!("{node_url}/action");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(node_url, e))?
            .error_for_status()
            .map_err(|e| transport_error(node_url, e))?;
        response.json().await.map_err(|e| transport_error(node_url, e))
    }

    async fn get_action_result(&self, node_url: &str, action_id: &str) -> Result<ActionResult> {
        let url = format!("{node_url}/action/{action_id}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(node_url, e))?
            .error_for_status()
            .map_err(|e| transport_error(node_url, e))?;
        response.json().await.map_err(|e| transport_error(node_url, e))
    }

    async fn send_admin_command(
        &self,
        node_url: &str,
        command: AdminCommand,
    ) -> Result<AdminCommandResponse> {
        let url = format!("{node_url}/admin/{}", admin_command_name(command));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| transport_error(node_url, e))?
            .error_for_status()
            .map_err(|e| transport_error(node_url, e))?;
        response.json().await.map_err(|e| transport_error(node_url, e))
    }
}

pub struct HttpNodeProbe {
    client: Client,
}

impl HttpNodeProbe {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build node HTTP client");
        Self { client }
    }
}

impl Default for HttpNodeProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl NodeProbe for HttpNodeProbe {
    async fn get_status(&self, node_url: &str) -> Result<NodeStatus> {
        let url = format!("{node_url}/status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(node_url, e))?
            .error_for_status()
            .map_err(|e| transport_error(node_url, e))?;
        response.json().await.map_err(|e| transport_error(node_url, e))
    }

    async fn get_info(&self, node_url: &str) -> Result<NodeInfo> {
        let url = format!("{node_url}/info");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(node_url, e))?
            .error_for_status()
            .map_err(|e| transport_error(node_url, e))?;
        response.json().await.map_err(|e| transport_error(node_url, e))
    }
}

pub fn admin_command_name(command: AdminCommand) -> &'static str {
    match command {
        AdminCommand::Pause => "pause",
        AdminCommand::Resume => "resume",
        AdminCommand::Cancel => "cancel",
        AdminCommand::Shutdown => "shutdown",
        AdminCommand::Reset => "reset",
        AdminCommand::Lock => "lock",
        AdminCommand::Unlock => "unlock",
        AdminCommand::Safen => "safen",
    }
}

pub fn parse_admin_command(name: &str) -> Option<AdminCommand> {
    match name {
        "pause" => Some(AdminCommand::Pause),
        "resume" => Some(AdminCommand::Resume),
        "cancel" => Some(AdminCommand::Cancel),
        "shutdown" => Some(AdminCommand::Shutdown),
        "reset" => Some(AdminCommand::Reset),
        "lock" => Some(AdminCommand::Lock),
        "unlock" => Some(AdminCommand::Unlock),
        "safen" => Some(AdminCommand::Safen),
        _ => None,
    }
}
