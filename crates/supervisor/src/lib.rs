//! llmgate supervisor
//!
//! Launches the model worker processes described by the server groups and
//! stops them in parallel, with a bounded wait, when the supervisor is asked
//! to shut down.

pub mod launcher;
pub mod process;
pub mod supervisor;

pub use launcher::{CommandLauncher, LaunchSpec, Launcher};
pub use process::{ManagedProcess, ProcessExit, ProcessHandle, ProcessState};
pub use supervisor::{ManagedInstance, ShutdownOutcome, ShutdownReport, StartupSummary, Supervisor};
