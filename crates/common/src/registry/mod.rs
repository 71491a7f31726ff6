//! Service registry client
//!
//! Model workers publish themselves in a registry group under their model name;
//! the gateway discovers them through the same registry. The gateway and the
//! workers only depend on the narrow traits defined here.

mod lease;
mod memory;
mod nacos;

pub use lease::RegistrationLease;
pub use memory::StaticRegistry;
pub use nacos::NacosRegistry;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A live instance of a registered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub healthy: bool,
}

impl ServiceInstance {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            weight: 1.0,
            healthy: true,
        }
    }

    /// gRPC endpoint URI of the instance
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// An instance a process publishes about itself
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRegistration {
    pub service_name: String,
    pub group: String,
    pub ip: String,
    pub port: u16,
    /// Load-balancing weight, 0 meaning equal weight
    pub weight: i64,
}

impl InstanceRegistration {
    /// Weight as published to the registry; 0 becomes the neutral weight 1
    pub fn effective_weight(&self) -> f64 {
        if self.weight <= 0 {
            1.0
        } else {
            self.weight as f64
        }
    }
}

/// Read side of the registry
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Names of every live service in `group`, in registry order
    async fn list_services(&self, group: &str) -> Result<Vec<String>>;

    /// Healthy instances of one service
    async fn list_instances(&self, service: &str, group: &str) -> Result<Vec<ServiceInstance>>;
}

/// Write side of the registry
#[async_trait]
pub trait ServiceRegistrar: Send + Sync {
    async fn register(&self, instance: &InstanceRegistration) -> Result<()>;

    /// Keep an ephemeral registration alive
    async fn heartbeat(&self, instance: &InstanceRegistration) -> Result<()>;

    async fn deregister(&self, instance: &InstanceRegistration) -> Result<()>;
}
