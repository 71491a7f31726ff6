//! Keeps an ephemeral registry registration alive for the lifetime of a server

use super::{InstanceRegistration, ServiceRegistrar};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A registration plus its background heartbeat task
pub struct RegistrationLease {
    registrar: Arc<dyn ServiceRegistrar>,
    registration: InstanceRegistration,
    stop: oneshot::Sender<()>,
    heartbeat: JoinHandle<()>,
}

impl RegistrationLease {
    /// Register the instance and start heartbeating every `interval`.
    ///
    /// The initial registration must succeed; later heartbeat failures are
    /// retried by registering again on the next tick.
    pub async fn acquire(
        registrar: Arc<dyn ServiceRegistrar>,
        registration: InstanceRegistration,
        interval: Duration,
    ) -> Result<Self> {
        registrar.register(&registration).await?;
        info!(
            service = %registration.service_name,
            group = %registration.group,
            address = %format!("{}:{}", registration.ip, registration.port),
            "Registered with registry"
        );

        let (stop, mut stopped) = oneshot::channel();
        let task_registrar = registrar.clone();
        let task_registration = registration.clone();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }

                if let Err(e) = task_registrar.heartbeat(&task_registration).await {
                    warn!(service = %task_registration.service_name, "Heartbeat failed: {}", e);
                    match task_registrar.register(&task_registration).await {
                        Ok(()) => info!(service = %task_registration.service_name, "Re-registered"),
                        Err(e) => warn!("Re-registration failed: {}", e),
                    }
                } else {
                    debug!(service = %task_registration.service_name, "Heartbeat sent");
                }
            }
        });

        Ok(Self {
            registrar,
            registration,
            stop,
            heartbeat,
        })
    }

    pub fn registration(&self) -> &InstanceRegistration {
        &self.registration
    }

    /// Stop heartbeating and remove the registration
    pub async fn release(self) {
        let _ = self.stop.send(());
        let _ = self.heartbeat.await;

        match self.registrar.deregister(&self.registration).await {
            Ok(()) => info!(service = %self.registration.service_name, "Deregistered from registry"),
            Err(e) => warn!(
                service = %self.registration.service_name,
                "Failed to deregister: {}", e
            ),
        }
    }
}
