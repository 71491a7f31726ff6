//! Configuration structures for llmgate
//!
//! This module defines the configuration shared by the gateway and the process
//! supervisor. It is loaded once from a YAML file at startup and treated as
//! immutable afterwards.
//!
//! `health_check`, `routing_rules` and `autoscaling` are parsed so that existing
//! configuration files load unchanged, but no component acts on them.

use crate::error::{LlmGateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the configuration file path
pub const CONFIG_PATH_ENV: &str = "LLMGATE_CONFIG";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "gateway.yaml";

/// Top-level configuration for llmgate components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway identity and listening port
    pub global: GlobalConfig,

    /// Service registry settings
    #[serde(alias = "nacos_config")]
    pub registry: RegistryConfig,

    /// Groups of model worker instances launched by the supervisor
    #[serde(default)]
    pub server_groups: Vec<ServerGroup>,

    /// Health check policy (parsed, not acted on)
    #[serde(default)]
    pub health_check: HealthCheck,

    /// Routing rules (parsed, not acted on)
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,

    /// Autoscaling policy (parsed, not acted on)
    #[serde(default)]
    pub autoscaling: AutoScaling,

    /// Worker launch and shutdown timing
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Gateway identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Name the gateway registers itself under
    #[serde(alias = "gateway_service_name")]
    pub service_name: String,

    /// Registry group that model workers register in
    pub model_service_group: String,

    /// gRPC port of the gateway
    pub port: u16,

    /// Bind address of the gateway
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Address published to the registry for the gateway
    #[serde(default = "default_advertise_ip")]
    pub advertise_ip: String,
}

/// Registry connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry address as `host:port`
    pub server_addr: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_registry_timeout")]
    pub timeout_ms: u64,

    /// Interval between instance heartbeats in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// One group of identical model worker instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerGroup {
    /// Model served by every instance of the group
    pub model_name: String,

    /// Model provider (currently only "ollama")
    pub provider: String,

    /// Provider base URL
    pub base_url: String,

    /// Number of instances started at launch
    pub init_instances: u16,

    /// Port of instance 0; instance `i` listens on `port + i`
    pub port: u16,

    /// Free-form numeric metadata; `weight` is passed to the workers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, i64>,
}

impl ServerGroup {
    /// Load-balancing weight, 0 meaning equal weight
    pub fn weight(&self) -> i64 {
        self.metadata.get("weight").copied().unwrap_or(0)
    }

    /// Port of the given instance, `None` when it does not fit in a port number
    pub fn instance_port(&self, instance_id: u16) -> Option<u16> {
        self.port.checked_add(instance_id)
    }
}

/// Health check policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub grace_period: String,
    #[serde(default)]
    pub failure_action: String,
}

/// Per-model routing rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingRule {
    pub model_name: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub fallback_to: String,
    #[serde(default)]
    pub timeout: String,
}

/// Autoscaling policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoScaling {
    #[serde(default)]
    pub metrics: Vec<ScalingMetric>,
    #[serde(default)]
    pub cooldown: String,
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default)]
    pub max_instances: u32,
}

/// Autoscaling trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalingMetric {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub threshold: i64,
    #[serde(default)]
    pub scale_out_step: u32,
    #[serde(default)]
    pub scale_in_step: u32,
}

/// Supervisor launch and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Worker executable
    #[serde(default = "default_worker_program")]
    pub program: String,

    /// Extra worker arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Delay between two consecutive spawns
    #[serde(default = "default_spawn_interval")]
    pub spawn_interval_ms: u64,

    /// Delay after the last spawn before the startup summary
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Per-process graceful shutdown timeout
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Delay after a graceful exit to let trailing output flush
    #[serde(default = "default_drain_delay")]
    pub drain_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            args: Vec::new(),
            spawn_interval_ms: default_spawn_interval(),
            settle_delay_ms: default_settle_delay(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            drain_delay_ms: default_drain_delay(),
        }
    }
}

impl SupervisorConfig {
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }
}

/// Default value functions
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

fn default_worker_program() -> String {
    "llmgate-worker".to_string()
}

fn default_spawn_interval() -> u64 {
    1000
}

fn default_settle_delay() -> u64 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_drain_delay() -> u64 {
    1000
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            LlmGateError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_yaml(&content).map_err(|e| {
            LlmGateError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(content)
            .map_err(|e| LlmGateError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the path in `LLMGATE_CONFIG`, or `gateway.yaml`
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.global.service_name.trim().is_empty() {
            return Err(LlmGateError::config("global.service_name must not be empty"));
        }
        if self.global.model_service_group.trim().is_empty() {
            return Err(LlmGateError::config(
                "global.model_service_group must not be empty",
            ));
        }
        validate_registry_addr(&self.registry.server_addr)?;

        let mut seen = HashSet::new();
        for group in &self.server_groups {
            if group.model_name.trim().is_empty() {
                return Err(LlmGateError::config("server group without model_name"));
            }
            if !seen.insert(group.model_name.as_str()) {
                return Err(LlmGateError::config(format!(
                    "Duplicate server group for model {}",
                    group.model_name
                )));
            }
            if group.provider.trim().is_empty() || group.base_url.trim().is_empty() {
                return Err(LlmGateError::config(format!(
                    "Server group {} needs a provider and a base_url",
                    group.model_name
                )));
            }
            if group.init_instances > 0
                && group.instance_port(group.init_instances - 1).is_none()
            {
                return Err(LlmGateError::config(format!(
                    "Server group {} ports overflow: {} + {} instances",
                    group.model_name, group.port, group.init_instances
                )));
            }
        }

        if self.supervisor.program.trim().is_empty() {
            return Err(LlmGateError::config("supervisor.program must not be empty"));
        }
        Ok(())
    }

    /// Names of the configuration sections that are parsed but inert
    pub fn inert_sections(&self) -> Vec<&'static str> {
        let mut sections = Vec::new();
        if !self.health_check.interval.is_empty() || !self.health_check.failure_action.is_empty()
        {
            sections.push("health_check");
        }
        if !self.routing_rules.is_empty() {
            sections.push("routing_rules");
        }
        if !self.autoscaling.metrics.is_empty() || self.autoscaling.max_instances > 0 {
            sections.push("autoscaling");
        }
        sections
    }

    /// Registry request timeout as Duration
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry.timeout_ms)
    }

    /// Total number of worker instances to launch
    pub fn total_instances(&self) -> usize {
        self.server_groups
            .iter()
            .map(|g| g.init_instances as usize)
            .sum()
    }
}

/// Check that a registry address has the `host:port` form
pub fn validate_registry_addr(addr: &str) -> Result<()> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
        LlmGateError::config(format!("Registry address {} must be host:port", addr))
    })?;
    if host.is_empty() {
        return Err(LlmGateError::config(format!(
            "Registry address {} has no host",
            addr
        )));
    }
    port.parse::<u16>().map_err(|e| {
        LlmGateError::config(format!("Failed to parse registry port in {}: {}", addr, e))
    })?;
    Ok(())
}
