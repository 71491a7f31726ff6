//! Process supervisor
//!
//! Spawns the worker instances described by the server groups, keeps track of
//! them, and on shutdown stops all of them in parallel within one bounded
//! window: SIGTERM first, SIGKILL for whatever is still running at the deadline.

use crate::launcher::{LaunchSpec, Launcher};
use crate::process::{ProcessHandle, ProcessState};
use llmgate_common::config::SupervisorConfig;
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::{GatewayConfig, ServerGroup, METRICS};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// One spawned worker instance and where it is in its lifecycle.
///
/// The state is only ever moved forward by the supervisor: `Spawned` on
/// launch, `Running` once tracked, then `GracefulExit` or `TimedOutKilled`
/// when shutdown resolves it.
#[derive(Debug)]
pub struct ManagedInstance<P> {
    label: String,
    handle: P,
    state: Mutex<ProcessState>,
}

impl<P: ProcessHandle> ManagedInstance<P> {
    fn new(label: String, handle: P) -> Self {
        Self {
            label,
            handle,
            state: Mutex::new(ProcessState::Spawned),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    pub fn handle(&self) -> &P {
        &self.handle
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    fn set_state(&self, next: ProcessState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }
}

/// Result of [`Supervisor::start_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupSummary {
    pub started: Vec<String>,
    pub failed: Vec<String>,
}

/// How one process was stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub label: String,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub warning: Option<String>,
}

/// Result of [`Supervisor::graceful_shutdown`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub outcomes: Vec<ShutdownOutcome>,
}

impl StartupSummary {
    /// `Running` for a started label, `SpawnFailed` for a failed one
    pub fn state_of(&self, label: &str) -> Option<ProcessState> {
        if self.started.iter().any(|l| l == label) {
            Some(ProcessState::Running)
        } else if self.failed.iter().any(|l| l == label) {
            Some(ProcessState::SpawnFailed)
        } else {
            None
        }
    }
}

impl ShutdownReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, state: ProcessState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

pub struct Supervisor<L: Launcher> {
    launcher: L,
    settings: SupervisorConfig,
    registry_addr: String,
    service_group: String,
    processes: Mutex<BTreeMap<u64, Arc<ManagedInstance<L::Process>>>>,
    next_key: AtomicU64,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(
        launcher: L,
        settings: SupervisorConfig,
        registry_addr: impl Into<String>,
        service_group: impl Into<String>,
    ) -> Self {
        Self {
            launcher,
            settings,
            registry_addr: registry_addr.into(),
            service_group: service_group.into(),
            processes: Mutex::new(BTreeMap::new()),
            next_key: AtomicU64::new(0),
        }
    }

    /// Supervisor whose workers register in the gateway's model group
    pub fn from_config(launcher: L, config: &GatewayConfig) -> Self {
        Self::new(
            launcher,
            config.supervisor.clone(),
            config.registry.server_addr.clone(),
            config.global.model_service_group.clone(),
        )
    }

    /// Number of processes currently tracked
    pub fn tracked(&self) -> usize {
        self.processes.lock().len()
    }

    /// Lifecycle state of every tracked process, in spawn order
    pub fn states(&self) -> Vec<(String, ProcessState)> {
        self.processes
            .lock()
            .values()
            .map(|instance| (instance.label.clone(), instance.state()))
            .collect()
    }

    /// Spawn instance `instance_id` of `group` and start tracking it.
    ///
    /// Nothing is tracked when the spawn fails.
    pub fn start_instance(
        &self,
        group: &ServerGroup,
        instance_id: u16,
    ) -> Result<Arc<ManagedInstance<L::Process>>> {
        let spec = LaunchSpec::for_instance(
            group,
            instance_id,
            &self.registry_addr,
            &self.service_group,
        )
        .ok_or_else(|| {
            LlmGateError::spawn_failed(
                format!("{}-instance-{}", group.model_name, instance_id),
                format!("port {} + {} overflows", group.port, instance_id),
            )
        })?;

        info!(
            model = %spec.model_name,
            instance = instance_id,
            port = spec.port,
            "Starting server instance"
        );

        let instance = Arc::new(ManagedInstance::new(
            spec.label(),
            self.launcher.launch(&spec)?,
        ));
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);

        let mut processes = self.processes.lock();
        processes.insert(key, instance.clone());
        instance.set_state(ProcessState::Running);
        METRICS.supervisor.running_processes.set(processes.len() as i64);
        Ok(instance)
    }

    /// Spawn every instance of every group, in order, one at a time
    pub async fn start_all(&self, groups: &[ServerGroup]) -> StartupSummary {
        let mut summary = StartupSummary::default();
        let mut first = true;

        for group in groups {
            for instance_id in 0..group.init_instances {
                if !first {
                    tokio::time::sleep(self.settings.spawn_interval()).await;
                }
                first = false;

                let label = match group.instance_port(instance_id) {
                    Some(port) => format!(
                        "{}-instance-{} on port {}",
                        group.model_name, instance_id, port
                    ),
                    None => format!("{}-instance-{}", group.model_name, instance_id),
                };

                match self.start_instance(group, instance_id) {
                    Ok(_) => {
                        METRICS.supervisor.instances_started.inc();
                        summary.started.push(label);
                    }
                    Err(e) => {
                        METRICS.supervisor.instances_failed.inc();
                        warn!("Failed to start server {}: {}", label, e);
                        summary.failed.push(label);
                    }
                }
            }
        }

        tokio::time::sleep(self.settings.settle_delay()).await;

        info!("========= Server startup summary =========");
        info!(
            "Successfully started {} servers: {:?}",
            summary.started.len(),
            summary.started
        );
        if !summary.failed.is_empty() {
            warn!("Failed to start {} servers: {:?}", summary.failed.len(), summary.failed);
        }
        summary
    }

    /// Stop every tracked process in parallel.
    ///
    /// All processes share one deadline, so the call returns after roughly the
    /// shutdown timeout plus the drain delay regardless of how many there are.
    pub async fn graceful_shutdown(&self) -> ShutdownReport {
        let snapshot: Vec<(u64, Arc<ManagedInstance<L::Process>>)> = self
            .processes
            .lock()
            .iter()
            .map(|(key, instance)| (*key, instance.clone()))
            .collect();

        if snapshot.is_empty() {
            return ShutdownReport::default();
        }

        info!("Initiating graceful shutdown of {} processes", snapshot.len());
        let deadline = Instant::now() + self.settings.shutdown_timeout();
        let drain = self.settings.drain_delay();

        let mut tasks = JoinSet::new();
        for (key, instance) in &snapshot {
            let (key, instance) = (*key, instance.clone());
            tasks.spawn(async move { (key, stop_process(instance, deadline, drain).await) });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => {
                    self.resolve(key);
                    match outcome.state {
                        ProcessState::GracefulExit => METRICS.supervisor.graceful_exits.inc(),
                        _ => METRICS.supervisor.forced_kills.inc(),
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => error!("Shutdown task failed: {}", e),
            }
        }

        // Anything whose task failed is not coming back either
        for (key, _) in &snapshot {
            self.resolve(*key);
        }

        info!(
            graceful = report.count(ProcessState::GracefulExit),
            killed = report.count(ProcessState::TimedOutKilled),
            "All processes have been shut down"
        );
        report
    }

    /// Start all groups, wait for `signal`, then shut everything down.
    ///
    /// `signal` is raced against startup as well, so a shutdown request that
    /// arrives mid-startup stops whatever has been spawned so far.
    pub async fn run_until<F>(&self, groups: &[ServerGroup], signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        let interrupted = tokio::select! {
            _ = self.start_all(groups) => false,
            _ = &mut signal => true,
        };

        if interrupted {
            warn!(
                "Shutdown requested during startup with {} processes spawned",
                self.tracked()
            );
        } else {
            signal.await;
        }
        self.graceful_shutdown().await
    }

    fn resolve(&self, key: u64) {
        let mut processes = self.processes.lock();
        processes.remove(&key);
        METRICS.supervisor.running_processes.set(processes.len() as i64);
    }
}

async fn stop_process<P: ProcessHandle>(
    instance: Arc<ManagedInstance<P>>,
    deadline: Instant,
    drain: Duration,
) -> ShutdownOutcome {
    let outcome = settle(&instance, deadline, drain).await;
    instance.set_state(outcome.state);
    outcome
}

async fn settle<P: ProcessHandle>(
    instance: &ManagedInstance<P>,
    deadline: Instant,
    drain: Duration,
) -> ShutdownOutcome {
    let (label, handle) = (instance.label(), instance.handle());
    let pid = handle.pid();
    let outcome = |state, warning| ShutdownOutcome {
        label: label.to_string(),
        pid,
        state,
        warning,
    };

    if let Err(e) = handle.terminate() {
        warn!(pid = ?pid, "Failed to send SIGTERM to {}: {}", label, e);
        if let Err(kill_err) = handle.kill().await {
            warn!(pid = ?pid, "Failed to kill {}: {}", label, kill_err);
        }
        return outcome(ProcessState::TimedOutKilled, Some(e.to_string()));
    }

    match handle.wait_until(deadline).await {
        Ok(Some(exit)) => {
            if !exit.success {
                warn!(pid = ?pid, code = ?exit.code, "Process {} exited with failure", label);
            }
            tokio::time::sleep(drain).await;
            info!(pid = ?pid, "Graceful shutdown --- {} shut down successfully", label);
            outcome(ProcessState::GracefulExit, None)
        }
        Ok(None) => {
            warn!(pid = ?pid, "Process {} shutdown timed out, forcing kill", label);
            let warning = handle.kill().await.err().map(|e| e.to_string());
            outcome(ProcessState::TimedOutKilled, warning)
        }
        Err(e) => {
            warn!(pid = ?pid, "Waiting for {} failed, forcing kill: {}", label, e);
            let warning = match handle.kill().await {
                Ok(()) => e.to_string(),
                Err(kill_err) => {
                    warn!(pid = ?pid, "Failed to kill {}: {}", label, kill_err);
                    format!("{}; kill failed: {}", e, kill_err)
                }
            };
            outcome(ProcessState::TimedOutKilled, Some(warning))
        }
    }
}
