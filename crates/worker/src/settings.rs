//! Worker settings
//!
//! A worker is configured entirely through its environment, which the process
//! supervisor derives from one server group entry.

use llmgate_common::config::validate_registry_addr;
use llmgate_common::error::{LlmGateError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Providers the worker can relay to
pub const SUPPORTED_PROVIDERS: &[&str] = &["ollama"];

/// Settings of one model worker process
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Model served, also the name registered in the registry (`MODEL_NAME`)
    pub model_name: String,

    /// Provider base URL (`BACKEND_URL`)
    pub backend_url: String,

    /// Provider kind (`PROVIDER`)
    pub provider: String,

    /// gRPC port (`SERVICE_PORT`)
    pub service_port: u16,

    /// Load-balancing weight, 0 meaning equal weight (`WEIGHT`)
    #[serde(default)]
    pub weight: i64,

    /// Position of this instance within its server group (`INSTANCE_ID`)
    #[serde(default)]
    pub instance_id: u16,

    /// Registry address as `host:port` (`REGISTRY_ADDR`)
    pub registry_addr: String,

    /// Registry group to register in (`SERVICE_GROUP`)
    #[serde(default = "default_service_group")]
    pub service_group: String,

    /// Bind address of the gRPC server (`BIND_ADDRESS`)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Address published to the registry (`ADVERTISE_IP`)
    #[serde(default = "default_advertise_ip")]
    pub advertise_ip: String,

    /// Registry request timeout in milliseconds (`REGISTRY_TIMEOUT_MS`)
    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_ms: u64,

    /// Heartbeat interval in seconds (`HEARTBEAT_INTERVAL_SECS`)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_service_group() -> String {
    "MODEL_GROUP".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_advertise_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_registry_timeout() -> u64 {
    5000
}

fn default_heartbeat_interval() -> u64 {
    5
}

impl WorkerSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::default())
    }

    /// Load settings from an explicit variable map instead of the environment
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(config::Environment::default().source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self> {
        let settings: WorkerSettings = config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LlmGateError::config(format!("Invalid worker settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(LlmGateError::config("MODEL_NAME must not be empty"));
        }
        if self.backend_url.trim().is_empty() {
            return Err(LlmGateError::config("BACKEND_URL must not be empty"));
        }
        if !SUPPORTED_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(LlmGateError::config(format!(
                "unsupported provider: {}",
                self.provider
            )));
        }
        if self.service_port == 0 {
            return Err(LlmGateError::config("SERVICE_PORT must not be 0"));
        }
        validate_registry_addr(&self.registry_addr)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}
