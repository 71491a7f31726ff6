//! Model client map
//!
//! Maps every model service discovered in the registry to a connection handle.
//! The map is built once, all-or-nothing, and is read-only afterwards.

use crate::backend_client::{BackendConnector, ChatBackend};
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::ServiceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable mapping from model name to backend handle
#[derive(Clone, Default)]
pub struct ModelClientMap {
    clients: HashMap<String, Arc<dyn ChatBackend>>,
}

impl ModelClientMap {
    /// Discover every service in `group` and connect to each of them.
    ///
    /// Fails with `RegistryUnavailable` when the registry cannot be queried,
    /// `NoServicesFound` when the group is empty, and with the connector's
    /// error (naming the service) when any single connection fails.
    pub async fn build(
        registry: &dyn ServiceRegistry,
        connector: &dyn BackendConnector,
        group: &str,
    ) -> Result<Self> {
        let services = registry.list_services(group).await.map_err(|e| match e {
            LlmGateError::RegistryUnavailable(_) => e,
            other => LlmGateError::registry(other.to_string()),
        })?;

        if services.is_empty() {
            return Err(LlmGateError::NoServicesFound {
                group: group.to_string(),
            });
        }

        info!("Found {} services in registry group {}", services.len(), group);

        let mut clients = HashMap::with_capacity(services.len());
        for service in services {
            if clients.contains_key(&service) {
                debug!(service = %service, "Skipping duplicate service name");
                continue;
            }
            let client = connector.connect(&service).await?;
            clients.insert(service, client);
        }

        Ok(Self { clients })
    }

    /// Build a map from already established handles
    pub fn from_clients<I>(clients: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn ChatBackend>)>,
    {
        Self {
            clients: clients.into_iter().collect(),
        }
    }

    pub fn get(&self, model: &str) -> Option<&Arc<dyn ChatBackend>> {
        self.clients.get(model)
    }

    /// Model names, sorted
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
