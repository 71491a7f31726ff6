//! llmgate supervisor - Main Entry Point
//!
//! Starts every configured worker instance, then waits for SIGINT or SIGTERM
//! and shuts all of them down.

use anyhow::Context;
use llmgate_common::{logging, shutdown_signal, GatewayConfig};
use llmgate_supervisor::{CommandLauncher, ProcessState, Supervisor};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("llmgate_supervisor=info,llmgate_common=info");
    let shutdown = shutdown_signal();

    info!("Starting llmgate supervisor");

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    for section in config.inert_sections() {
        warn!("Configuration section '{}' is parsed but not acted on", section);
    }
    info!(
        "Launching {} worker instances across {} server groups",
        config.total_instances(),
        config.server_groups.len()
    );

    let launcher = CommandLauncher::new(
        config.supervisor.program.clone(),
        config.supervisor.args.clone(),
    );
    let supervisor = Supervisor::from_config(launcher, &config);

    let report = supervisor
        .run_until(&config.server_groups, shutdown)
        .await;

    info!(
        graceful = report.count(ProcessState::GracefulExit),
        killed = report.count(ProcessState::TimedOutKilled),
        "llmgate supervisor shutdown complete"
    );
    Ok(())
}
