//! llmgate gateway - Main Entry Point
//!
//! Discovers the model services in the registry, registers the gateway itself
//! and serves the Chat and GetInfo RPCs until SIGINT or SIGTERM.

use anyhow::Context;
use llmgate_common::{
    logging, shutdown_signal, GatewayConfig, InstanceRegistration, NacosRegistry,
    RegistrationLease, ServiceRegistrar, ServiceRegistry,
};
use llmgate_gateway::{GatewayInfoService, GrpcConnector, Router};
use llmgate_proto::{ChatServiceServer, GatewayServiceServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{info, warn};

/// Group the gateway registers itself in
const GATEWAY_GROUP: &str = "DEFAULT_GROUP";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("llmgate_gateway=info,llmgate_common=info");

    info!("Starting llmgate gateway");

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    for section in config.inert_sections() {
        warn!("Configuration section '{}' is parsed but not acted on", section);
    }

    let global = &config.global;
    let addr: SocketAddr = format!("{}:{}", global.bind_address, global.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                global.bind_address, global.port
            )
        })?;

    let nacos = Arc::new(NacosRegistry::new(
        &config.registry.server_addr,
        config.registry_timeout(),
    )?);
    let registry: Arc<dyn ServiceRegistry> = nacos.clone();
    let registrar: Arc<dyn ServiceRegistrar> = nacos;

    let connector = GrpcConnector::new(
        registry.clone(),
        global.model_service_group.clone(),
        config.registry_timeout(),
    );
    let router = Router::connect(registry.as_ref(), &connector, &global.model_service_group)
        .await
        .context("Failed to build model clients")?;
    info!(
        "Routing {} models: {}",
        router.clients().len(),
        router.clients().models().join(", ")
    );

    let info_service = GatewayInfoService::new(registry, global.model_service_group.clone());

    let lease = RegistrationLease::acquire(
        registrar,
        InstanceRegistration {
            service_name: global.service_name.clone(),
            group: GATEWAY_GROUP.to_string(),
            ip: global.advertise_ip.clone(),
            port: global.port,
            weight: 0,
        },
        config.registry.heartbeat_interval(),
    )
    .await
    .context("Failed to register gateway")?;

    info!("Gateway listening on {}", addr);

    let served = Server::builder()
        .add_service(ChatServiceServer::new(router))
        .add_service(GatewayServiceServer::new(info_service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await;

    lease.release().await;
    served.context("gRPC server failed")?;

    info!("llmgate gateway shutdown complete");
    Ok(())
}
