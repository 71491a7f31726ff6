//! Worker gRPC server implementation

use crate::provider::{ChatProvider, ProviderMessage, Role, TokenStream};
use futures::StreamExt;
use llmgate_common::boundary::isolate;
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::METRICS;
use llmgate_proto::{ChatMessage, ChatRequest, ChatResponse, ChatService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

type ChunkSender = mpsc::Sender<std::result::Result<ChatResponse, Status>>;

/// Serves the chat RPC for one model by relaying to a provider
#[derive(Clone)]
pub struct ChatServer {
    model_name: String,
    provider: Arc<dyn ChatProvider>,
    port: u16,
    weight: i64,
}

impl ChatServer {
    pub fn new(
        model_name: impl Into<String>,
        provider: Arc<dyn ChatProvider>,
        port: u16,
        weight: i64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider,
            port,
            weight,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Validate a request and convert it into provider messages
    pub fn prepare(&self, request: &ChatRequest) -> Result<Vec<ProviderMessage>> {
        if request.model != self.model_name {
            return Err(LlmGateError::invalid_request(format!(
                "model mismatch: expected {}, got {}",
                self.model_name, request.model
            )));
        }
        if request.messages.is_empty() {
            return Err(LlmGateError::invalid_request("request contains no messages"));
        }

        request.messages.iter().map(convert_message).collect()
    }
}

fn convert_message(message: &ChatMessage) -> Result<ProviderMessage> {
    let role = Role::from_wire(&message.role)?;

    // Attachments travel as base64 text and are handed to the provider as is
    let mut images = Vec::new();
    if !message.bin.is_empty() {
        let encoded = std::str::from_utf8(&message.bin).map_err(|_| {
            LlmGateError::invalid_request("attachment is not base64 text")
        })?;
        images.push(encoded.trim().to_string());
    }

    Ok(ProviderMessage {
        role,
        content: message.content.clone(),
        images,
    })
}

async fn relay(mut tokens: TokenStream, model: String, tx: &ChunkSender) -> Result<u64> {
    let mut sent = 0u64;
    while let Some(token) = tokens.next().await {
        let content = token?;
        tx.send(Ok(ChatResponse {
            content,
            model: model.clone(),
        }))
        .await
        .map_err(|_| LlmGateError::ForwardFailed("caller disconnected".to_string()))?;
        sent += 1;
        METRICS.worker.chunks_generated_total.inc();
    }
    Ok(sent)
}

#[tonic::async_trait]
impl ChatService for ChatServer {
    type ChatStream = ReceiverStream<std::result::Result<ChatResponse, Status>>;

    async fn chat(
        &self,
        request: Request<ChatRequest>,
    ) -> std::result::Result<Response<Self::ChatStream>, Status> {
        METRICS.worker.chat_requests_total.inc();
        debug!(
            weight = self.weight,
            port = self.port,
            "Answering chat request"
        );

        let request = request.into_inner();
        let messages = self.prepare(&request).map_err(|e| {
            METRICS.worker.chat_requests_failed.inc();
            warn!("Rejected chat request: {}", e);
            e.to_status()
        })?;

        let provider = self.provider.clone();
        let tokens = isolate(async move { provider.stream_chat(messages).await })
            .await
            .map_err(|e| {
                METRICS.worker.chat_requests_failed.inc();
                warn!(model = %self.model_name, "Generation failed: {}", e);
                e.to_status()
            })?;

        let (tx, rx) = mpsc::channel(1);
        let model = self.model_name.clone();
        tokio::spawn(async move {
            match isolate(relay(tokens, model.clone(), &tx)).await {
                Ok(chunks) => info!(model = %model, chunks, "Chat stream completed"),
                Err(LlmGateError::ForwardFailed(reason)) => {
                    debug!(model = %model, "Stopped streaming: {}", reason)
                }
                Err(e) => {
                    METRICS.worker.chat_requests_failed.inc();
                    warn!(model = %model, "Generation failed: {}", e);
                    let _ = tx.send(Err(e.to_status())).await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
