// The static topology a workcell is configured with, and the small bundle
// of runtime settings that travel alongside it (lock TTL, poll interval).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::location::LocationDefinition;
use super::node::NodeDefinition;
use super::transfer::TransferTemplate;

/// Knobs that govern engine behavior but aren't part of the lab's physical
/// topology: how long an advisory state lock is held, how often the
/// liveness poller sweeps nodes, how often the scheduler ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkcellConfig {
    #[serde(default = "default_lock_ttl_seconds")]
    pub state_lock_ttl_seconds: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub node_poll_interval_ms: u64,
    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,
}

fn default_lock_ttl_seconds() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_scheduler_tick_ms() -> u64 {
    250
}

impl Default for WorkcellConfig {
    fn default() -> Self {
        Self {
            state_lock_ttl_seconds: default_lock_ttl_seconds(),
            node_poll_interval_ms: default_poll_interval_ms(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
        }
    }
}

/// Static definition of a workcell: the nodes and locations it contains and
/// the transfer templates describing how resources move between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkcellDefinition {
    pub workcell_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: HashMap<String, NodeDefinition>,
    pub locations: HashMap<String, LocationDefinition>,
    #[serde(default)]
    pub transfer_templates: Vec<TransferTemplate>,
    #[serde(default)]
    pub config: WorkcellConfig,
}

impl WorkcellDefinition {
    /// Every node name referenced by a transfer template or location
    /// reference must name a node actually declared in `nodes`. The
    /// compiler runs this once at workcell load time, not per workflow.
    pub fn validate_topology(&self) -> Result<(), String> {
        for template in &self.transfer_templates {
            if !self.nodes.contains_key(&template.node_name) {
                return Err(format!(
                    "transfer template '{}' references unknown node '{}'",
                    template.template_name, template.node_name
                ));
            }
        }
        for (location_name, location) in &self.locations {
            for node_name in location.reference.keys() {
                if !self.nodes.contains_key(node_name) {
                    return Err(format!(
                        "location '{}' references unknown node '{}'",
                        location_name, node_name
                    ));
                }
            }
            for node_name in location.node_overrides.keys() {
                if !self.nodes.contains_key(node_name) {
                    return Err(format!(
                        "location '{}' has a transfer-arg override for unknown node '{}'",
                        location_name, node_name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Status of the workcell as a whole, reported by the Ingress API's health
/// endpoint: up if the state store and every node are reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkcellStatus {
    #[default]
    Initializing,
    Ready,
    Degraded,
    ShuttingDown,
}

/// Runtime snapshot of the whole workcell, assembled on demand for the
/// `GET /status` and `GET /health` endpoints rather than persisted wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkcellState {
    pub status: WorkcellStatus,
    pub paused: bool,
    pub locked: bool,
}

impl Default for WorkcellState {
    fn default() -> Self {
        Self { status: WorkcellStatus::Initializing, paused: false, locked: false }
    }
}
