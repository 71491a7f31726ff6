//! Launching worker processes

use crate::process::{ManagedProcess, ProcessHandle};
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::ServerGroup;
use std::process::Stdio;
use tokio::process::Command;

/// Everything that distinguishes one worker instance from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub model_name: String,
    pub backend_url: String,
    pub provider: String,
    pub port: u16,
    pub weight: i64,
    pub instance_id: u16,
    pub registry_addr: String,
    pub service_group: String,
}

impl LaunchSpec {
    /// Spec of instance `instance_id` of `group`, `None` when its port overflows
    pub fn for_instance(
        group: &ServerGroup,
        instance_id: u16,
        registry_addr: &str,
        service_group: &str,
    ) -> Option<Self> {
        Some(Self {
            model_name: group.model_name.clone(),
            backend_url: group.base_url.clone(),
            provider: group.provider.clone(),
            port: group.instance_port(instance_id)?,
            weight: group.weight(),
            instance_id,
            registry_addr: registry_addr.to_string(),
            service_group: service_group.to_string(),
        })
    }

    /// Identifier used in logs and startup summaries
    pub fn label(&self) -> String {
        format!(
            "{}-instance-{} on port {}",
            self.model_name, self.instance_id, self.port
        )
    }

    /// Environment passed to the worker on top of the supervisor's own
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MODEL_NAME", self.model_name.clone()),
            ("BACKEND_URL", self.backend_url.clone()),
            ("PROVIDER", self.provider.clone()),
            ("SERVICE_PORT", self.port.to_string()),
            ("WEIGHT", self.weight.to_string()),
            ("INSTANCE_ID", self.instance_id.to_string()),
            ("REGISTRY_ADDR", self.registry_addr.clone()),
            ("SERVICE_GROUP", self.service_group.clone()),
        ]
    }
}

/// Starts one OS process per worker instance
pub trait Launcher: Send + Sync {
    type Process: ProcessHandle;

    fn launch(&self, spec: &LaunchSpec) -> Result<Self::Process>;
}

/// Launches the worker binary as a child process
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, spec: &LaunchSpec) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(spec.env())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }
}

impl Launcher for CommandLauncher {
    type Process = ManagedProcess;

    fn launch(&self, spec: &LaunchSpec) -> Result<ManagedProcess> {
        let child = self
            .command(spec)
            .spawn()
            .map_err(|e| LlmGateError::spawn_failed(spec.label(), e.to_string()))?;
        Ok(ManagedProcess::new(child))
    }
}
