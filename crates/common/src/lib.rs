//! llmgate common library
//!
//! This crate contains shared code used by the gateway, the model workers and
//! the process supervisor.

pub mod boundary;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod signals;

// Re-export commonly used types
pub use config::{GatewayConfig, ServerGroup};
pub use error::{LlmGateError, Result};
pub use metrics::{MetricsRegistry, METRICS};
pub use registry::{
    InstanceRegistration, NacosRegistry, RegistrationLease, ServiceInstance, ServiceRegistrar,
    ServiceRegistry, StaticRegistry,
};
pub use signals::shutdown_signal;
