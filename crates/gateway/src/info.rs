//! Gateway info service
//!
//! Answers which model services are currently registered in a group.

use llmgate_common::{ServiceRegistry, METRICS};
use llmgate_proto::{GatewayService, GetInfoRequest, GetInfoResponse};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

/// Lists the models available in the registry.
///
/// Queries the registry on every call, so the answer can differ from the set
/// of models the router was built with.
#[derive(Clone)]
pub struct GatewayInfoService {
    registry: Arc<dyn ServiceRegistry>,
    default_group: String,
}

impl GatewayInfoService {
    pub fn new(registry: Arc<dyn ServiceRegistry>, default_group: impl Into<String>) -> Self {
        Self {
            registry,
            default_group: default_group.into(),
        }
    }

    /// Model services registered in `group`, in registry order
    pub async fn available_models(&self, group: &str) -> llmgate_common::Result<Vec<String>> {
        let group = if group.is_empty() {
            self.default_group.as_str()
        } else {
            group
        };
        self.registry.list_services(group).await
    }
}

#[tonic::async_trait]
impl GatewayService for GatewayInfoService {
    async fn get_info(
        &self,
        request: Request<GetInfoRequest>,
    ) -> Result<Response<GetInfoResponse>, Status> {
        METRICS.gateway.info_requests_total.inc();
        let group = request.into_inner().group_name;

        let available_models = self.available_models(&group).await.map_err(|e| {
            warn!("GetInfo failed for group '{}': {}", group, e);
            e.to_status()
        })?;

        debug!(count = available_models.len(), "Answered GetInfo");
        Ok(Response::new(GetInfoResponse { available_models }))
    }
}
