// Node Liveness Poller: periodically refreshes every node's status/info in
// the State Store, so the scheduler's readiness check never has to make a
// network call of its own.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::models::{NodeInfo, NodeStatus};

use super::state_store::WorkcellStateStore;

/// What the poller needs from a node, separate from `NodeClient` (the
/// dispatcher's action-sending trait) since a node that can't run actions
/// right now might still answer a status probe.
#[async_trait]
pub trait NodeProbe: Send + Sync {
    async fn get_status(&self, node_url: &str) -> Result<NodeStatus>;
    async fn get_info(&self, node_url: &str) -> Result<NodeInfo>;
}

pub struct NodePoller<P: NodeProbe> {
    probe: P,
    interval: Duration,
}

impl<P: NodeProbe> NodePoller<P> {
    pub fn new(probe: P, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Run forever, polling every node in `node_urls` once per tick.
    /// Meant to be spawned as its own task; a probe error for one node
    /// is logged and skipped rather than aborting the whole loop - one
    /// unreachable node must not blind the poller to the rest.
    pub async fn run(&self, store: &dyn WorkcellStateStore, node_urls: HashMap<String, String>) -> ! {
        loop {
            self.poll_once(store, &node_urls).await;
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn poll_once(&self, store: &dyn WorkcellStateStore, node_urls: &HashMap<String, String>) {
        for (name, url) in node_urls {
            if let Err(e) = self.poll_node(store, name, url).await {
                warn!(node_name = %name, error = %e, "node liveness probe failed");
            }
        }
    }

    async fn poll_node(&self, store: &dyn WorkcellStateStore, name: &str, url: &str) -> Result<()> {
        let status = self.probe.get_status(url).await?;
        let info = self.probe.get_info(url).await.ok();

        let mut node = store.get_node(name).await?.unwrap_or_else(|| crate::models::Node::new(url));
        node.status = Some(status);
        if info.is_some() {
            node.info = info;
        }
        store.set_node(name, node).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state_store::InMemoryStateStore;
    use crate::models::NodeDefinition;

    struct FakeProbe {
        status: NodeStatus,
        fail: bool,
    }

    #[async_trait]
    impl NodeProbe for FakeProbe {
        async fn get_status(&self, _node_url: &str) -> Result<NodeStatus> {
            if self.fail {
                return Err(crate::error::WorkcellError::NodeUnavailable("down".into()));
            }
            Ok(self.status.clone())
        }

        async fn get_info(&self, _node_url: &str) -> Result<NodeInfo> {
            Ok(NodeInfo {
                definition: NodeDefinition {
                    node_name: "arm1".into(),
                    node_id: "id".into(),
                    node_url: None,
                    node_description: None,
                    module_name: None,
                    module_version: None,
                    capabilities: Default::default(),
                    commands: Default::default(),
                    config_defaults: Default::default(),
                },
                actions: Default::default(),
                config: Default::default(),
                config_schema: None,
            })
        }
    }

    #[tokio::test]
    async fn polling_writes_status_into_the_store() {
        let store = InMemoryStateStore::new();
        let poller = NodePoller::new(FakeProbe { status: NodeStatus::default(), fail: false }, Duration::from_millis(1));
        let mut urls = HashMap::new();
        urls.insert("arm1".to_string(), "http://localhost:9000".to_string());

        poller.poll_once(&store, &urls).await;

        let node = store.get_node("arm1").await.unwrap().unwrap();
        assert!(node.status.is_some());
        assert!(node.info.is_some());
    }

    #[tokio::test]
    async fn a_failing_probe_does_not_panic_or_clear_existing_state() {
        let store = InMemoryStateStore::new();
        let mut seeded = crate::models::Node::new("http://localhost:9000");
        seeded.status = Some(NodeStatus::default());
        store.set_node("arm1", seeded).await.unwrap();

        let poller = NodePoller::new(FakeProbe { status: NodeStatus::default(), fail: true }, Duration::from_millis(1));
        let mut urls = HashMap::new();
        urls.insert("arm1".to_string(), "http://localhost:9000".to_string());
        poller.poll_once(&store, &urls).await;

        let node = store.get_node("arm1").await.unwrap().unwrap();
        assert!(node.status.is_some());
    }
}
