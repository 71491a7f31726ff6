//! In-process registry

use super::{InstanceRegistration, ServiceInstance, ServiceRegistrar, ServiceRegistry};
use crate::error::{LlmGateError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
struct Entry {
    group: String,
    service: String,
    instances: Vec<ServiceInstance>,
}

/// Registry held in memory, keeping services in insertion order.
///
/// Used when the gateway and its workers share a process, and in tests.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    entries: RwLock<Vec<Entry>>,
    unavailable: AtomicBool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance, creating the service entry if needed
    pub fn add_instance(&self, group: &str, service: &str, instance: ServiceInstance) {
        let mut entries = self.entries.write();
        match entries
            .iter_mut()
            .find(|e| e.group == group && e.service == service)
        {
            Some(entry) => entry.instances.push(instance),
            None => entries.push(Entry {
                group: group.to_string(),
                service: service.to_string(),
                instances: vec![instance],
            }),
        }
    }

    /// Add a service with no live instances
    pub fn add_service(&self, group: &str, service: &str) {
        let mut entries = self.entries.write();
        if !entries.iter().any(|e| e.group == group && e.service == service) {
            entries.push(Entry {
                group: group.to_string(),
                service: service.to_string(),
                instances: Vec::new(),
            });
        }
    }

    /// Make every query fail, as if the registry were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LlmGateError::registry("registry is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn list_services(&self, group: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.group == group)
            .map(|e| e.service.clone())
            .collect())
    }

    async fn list_instances(&self, service: &str, group: &str) -> Result<Vec<ServiceInstance>> {
        self.check_available()?;
        Ok(self
            .entries
            .read()
            .iter()
            .find(|e| e.group == group && e.service == service)
            .map(|e| e.instances.iter().filter(|i| i.healthy).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ServiceRegistrar for StaticRegistry {
    async fn register(&self, instance: &InstanceRegistration) -> Result<()> {
        self.check_available()?;
        let mut entry = ServiceInstance::new(instance.ip.clone(), instance.port);
        entry.weight = instance.effective_weight();
        self.add_instance(&instance.group, &instance.service_name, entry);
        Ok(())
    }

    async fn heartbeat(&self, _instance: &InstanceRegistration) -> Result<()> {
        self.check_available()
    }

    async fn deregister(&self, instance: &InstanceRegistration) -> Result<()> {
        self.check_available()?;
        let mut entries = self.entries.write();
        for entry in entries
            .iter_mut()
            .filter(|e| e.group == instance.group && e.service == instance.service_name)
        {
            entry
                .instances
                .retain(|i| !(i.ip == instance.ip && i.port == instance.port));
        }
        entries.retain(|e| !e.instances.is_empty());
        Ok(())
    }
}
