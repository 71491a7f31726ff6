//! OS signal handling.
//!
//! SIGINT and SIGTERM both resolve the shutdown future. The handlers are
//! installed when [`shutdown_signal`] is called, not when the future is first
//! polled, so a signal that arrives before anyone awaits it is not lost.

use std::future::Future;
use tracing::{info, warn};

/// Install SIGINT and SIGTERM handlers and return a future that resolves on
/// the first of them. Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt())
        .map_err(|e| warn!("Failed to listen for SIGINT: {}", e))
        .ok();
    let terminate = signal(SignalKind::terminate())
        .map_err(|e| warn!("Failed to listen for SIGTERM: {}", e))
        .ok();

    async move {
        let interrupt = async {
            match interrupt {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        let terminate = async {
            match terminate {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = interrupt => info!("Received SIGINT"),
            _ = terminate => info!("Received SIGTERM"),
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
