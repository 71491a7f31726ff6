//! llmgate worker - Main Entry Point
//!
//! Reads its settings from the environment, registers the model service in the
//! registry and serves chat requests until SIGINT or SIGTERM.

use anyhow::Context;
use llmgate_common::{
    logging, shutdown_signal, InstanceRegistration, NacosRegistry, RegistrationLease,
};
use llmgate_proto::ChatServiceServer;
use llmgate_worker::{create_provider, ChatServer, WorkerSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("llmgate_worker=info,llmgate_common=info");

    let settings = WorkerSettings::from_env().context("Failed to load worker settings")?;
    info!(
        model = %settings.model_name,
        provider = %settings.provider,
        instance = settings.instance_id,
        "Starting llmgate worker"
    );

    let addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.service_port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                settings.bind_address, settings.service_port
            )
        })?;

    let provider = create_provider(&settings).context("Failed to initialize provider")?;
    let server = ChatServer::new(
        settings.model_name.clone(),
        provider,
        settings.service_port,
        settings.weight,
    );

    let registry = Arc::new(NacosRegistry::new(
        &settings.registry_addr,
        settings.registry_timeout(),
    )?);
    let lease = RegistrationLease::acquire(
        registry,
        InstanceRegistration {
            service_name: settings.model_name.clone(),
            group: settings.service_group.clone(),
            ip: settings.advertise_ip.clone(),
            port: settings.service_port,
            weight: settings.weight,
        },
        settings.heartbeat_interval(),
    )
    .await
    .context("Failed to register worker")?;

    info!("Worker listening on {}", addr);

    let served = Server::builder()
        .add_service(ChatServiceServer::new(server))
        .serve_with_shutdown(addr, shutdown_signal())
        .await;

    lease.release().await;
    served.context("gRPC server failed")?;

    info!("llmgate worker shutdown complete");
    Ok(())
}
