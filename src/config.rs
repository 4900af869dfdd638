// Layered settings, read the same way the distilled source's manager
// settings were: a base file, an optional environment-specific override
// file, then environment variables under one prefix, each layer winning
// over the last.

use serde::Deserialize;

use crate::error::{Result, WorkcellError};

const ENV_PREFIX: &str = "WORKCELL";

#[derive(Debug, Clone, Deserialize)]
pub struct WorkcellSettings {
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,

    /// "memory" or "nats" - selects the State Store backend (§4.A ships
    /// both; this picks which one `bin/server` wires up).
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Base URL of the Resource Manager collaborator (§6.2), consulted only
    /// when a location's definition embeds a `resource_definition`.
    #[serde(default = "default_resource_manager_url")]
    pub resource_manager_url: String,

    #[serde(default = "default_lock_ttl")]
    pub state_lock_ttl_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub node_poll_interval_ms: u64,
    #[serde(default = "default_scheduler_tick")]
    pub scheduler_tick_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub workcell_definition_path: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_storage_backend() -> String {
    "memory".to_string()
}
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}
fn default_resource_manager_url() -> String {
    "http://localhost:8003".to_string()
}
fn default_lock_ttl() -> u64 {
    60
}
fn default_poll_interval() -> u64 {
    1_000
}
fn default_scheduler_tick() -> u64 {
    250
}
fn default_log_level() -> String {
    "info".to_string()
}

impl WorkcellSettings {
    /// Load settings from (in increasing precedence): built-in defaults,
    /// `config/default`, `config/{WORKCELL_ENVIRONMENT}`, then
    /// `WORKCELL_*` environment variables. Every layer is optional except
    /// the defaults baked into the field attributes above.
    pub fn load() -> Result<Self> {
        let environment = std::env::var("WORKCELL_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .map_err(|e| WorkcellError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| WorkcellError::Configuration(e.to_string()))
    }
}
