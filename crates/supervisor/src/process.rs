//! Managed OS processes
//!
//! A [`ProcessHandle`] is everything the supervisor needs from a spawned
//! worker: ask it to stop, wait for it with a deadline, and kill it.

use async_trait::async_trait;
use llmgate_common::error::{LlmGateError, Result};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Lifecycle of one managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawn requested, not yet confirmed
    Spawned,
    /// Tracked and presumed alive
    Running,
    /// Exited on its own after SIGTERM, before the deadline
    GracefulExit,
    /// Force-killed after the deadline or a failed SIGTERM
    TimedOutKilled,
    /// Never started
    SpawnFailed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::GracefulExit | ProcessState::TimedOutKilled | ProcessState::SpawnFailed
        )
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    /// Exit code, `None` when the process was ended by a signal
    pub code: Option<i32>,
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

#[async_trait]
pub trait ProcessHandle: Send + Sync + 'static {
    /// OS process id, `None` once the process has been reaped
    fn pid(&self) -> Option<u32>;

    /// Ask the process to stop (SIGTERM)
    fn terminate(&self) -> Result<()>;

    /// Wait for the process to exit
    async fn wait(&self) -> Result<ProcessExit>;

    /// Wait for the process to exit, giving up at `deadline`
    async fn wait_until(&self, deadline: Instant) -> Result<Option<ProcessExit>> {
        match tokio::time::timeout_at(deadline, self.wait()).await {
            Ok(exit) => exit.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Force the process to stop (SIGKILL) and reap it
    async fn kill(&self) -> Result<()>;
}

/// A child process spawned by this supervisor
#[derive(Debug)]
pub struct ManagedProcess {
    pid: Option<u32>,
    child: Mutex<Child>,
}

impl ManagedProcess {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(child),
        }
    }
}

#[async_trait]
impl ProcessHandle for ManagedProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn terminate(&self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self
            .pid
            .ok_or_else(|| LlmGateError::Signal("process has no pid".to_string()))?;
        let pid = i32::try_from(pid)
            .map_err(|_| LlmGateError::Signal(format!("pid {} out of range", pid)))?;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| LlmGateError::Signal(format!("SIGTERM to {} failed: {}", pid, e)))
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> Result<()> {
        Err(LlmGateError::Signal(
            "SIGTERM is not available on this platform".to_string(),
        ))
    }

    async fn wait(&self) -> Result<ProcessExit> {
        let status = self.child.lock().await.wait().await?;
        Ok(status.into())
    }

    async fn kill(&self) -> Result<()> {
        self.child.lock().await.kill().await?;
        Ok(())
    }
}
