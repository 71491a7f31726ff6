//! Connection handles from the gateway to model workers

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::ServiceRegistry;
use llmgate_proto::{ChatRequest, ChatResponse, ChatServiceClient};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::{debug, info};

/// Chunks emitted by a backend for one chat call
pub type ChunkStream = BoxStream<'static, std::result::Result<ChatResponse, Status>>;

/// A reusable handle able to open chat streams on one model service
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed chat call. Dropping the returned stream cancels the call.
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}

/// Turns a discovered service name into a [`ChatBackend`]
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, service: &str) -> Result<Arc<dyn ChatBackend>>;
}

/// gRPC client for one model service
#[derive(Clone)]
pub struct BackendClient {
    service: String,
    client: ChatServiceClient<Channel>,
}

impl BackendClient {
    pub fn new(service: impl Into<String>, channel: Channel) -> Self {
        Self {
            service: service.into(),
            client: ChatServiceClient::new(channel),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        debug!(service = %self.service, "Opening backend chat stream");
        let mut client = self.client.clone();
        let response = client
            .chat(request)
            .await
            .map_err(LlmGateError::BackendStream)?;
        Ok(response.into_inner().boxed())
    }
}

/// Connects to a service through the instances the registry reports for it.
///
/// All instances of a service share one balanced channel; picking an instance
/// per call is left to the transport.
pub struct GrpcConnector {
    registry: Arc<dyn ServiceRegistry>,
    group: String,
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        group: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            group: group.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl BackendConnector for GrpcConnector {
    async fn connect(&self, service: &str) -> Result<Arc<dyn ChatBackend>> {
        let instances = self
            .registry
            .list_instances(service, &self.group)
            .await
            .map_err(|e| LlmGateError::connect(service, e.to_string()))?;

        if instances.is_empty() {
            return Err(LlmGateError::connect(service, "no live instances"));
        }

        let endpoints = instances
            .iter()
            .map(|instance| {
                Endpoint::from_shared(instance.endpoint())
                    .map(|e| e.connect_timeout(self.connect_timeout))
                    .map_err(|e| {
                        LlmGateError::connect(
                            service,
                            format!("invalid endpoint {}: {}", instance.endpoint(), e),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            service = %service,
            instances = endpoints.len(),
            "Created client for service"
        );
        let channel = Channel::balance_list(endpoints.into_iter());
        Ok(Arc::new(BackendClient::new(service, channel)))
    }
}
