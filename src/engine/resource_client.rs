// Resource Manager client: the workcell engine's only touchpoint with the
// Resource Manager collaborator (§6.2). `initialize_workcell_state` is the
// sole caller - it creates a resource for any location whose definition
// embeds one and that has no `resource_id` recorded yet.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, WorkcellError};
use crate::models::{Resource, ResourceDefinition};

#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    async fn add_resource(&self, definition: &ResourceDefinition) -> Result<Resource>;
}

#[derive(Clone)]
pub struct HttpResourceManagerClient {
    client: Client,
    base_url: String,
}

impl HttpResourceManagerClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build resource manager HTTP client");
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl ResourceManagerClient for HttpResourceManagerClient {
    async fn add_resource(&self, definition: &ResourceDefinition) -> Result<Resource> {
        let url = format!("{}/resource", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(definition)
            .send()
            .await
            .map_err(|e| WorkcellError::TransientBackend(anyhow::anyhow!(e)))?
            .error_for_status()
            .map_err(|e| WorkcellError::TransientBackend(anyhow::anyhow!(e)))?;
        response
            .json()
            .await
            .map_err(|e| WorkcellError::TransientBackend(anyhow::anyhow!(e)))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Hands back a resource id derived from the call count, so tests can
    /// assert a resource was actually requested without a real Resource
    /// Manager.
    #[derive(Default)]
    pub struct MockResourceManagerClient {
        pub created: Mutex<Vec<ResourceDefinition>>,
    }

    #[async_trait]
    impl ResourceManagerClient for MockResourceManagerClient {
        async fn add_resource(&self, definition: &ResourceDefinition) -> Result<Resource> {
            let mut created = self.created.lock().unwrap();
            let id = format!("resource-{}", created.len() + 1);
            created.push(definition.clone());
            Ok(Resource::from_definition(id, definition))
        }
    }
}
