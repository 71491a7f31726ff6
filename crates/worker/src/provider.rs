//! Model providers
//!
//! A provider turns a conversation into a stream of generated text chunks.
//! Ollama's `/api/chat` endpoint is the only provider implemented; it streams
//! newline-delimited JSON objects, one per generated chunk.

use crate::settings::WorkerSettings;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use llmgate_common::error::{LlmGateError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Generated text chunks, ending early with an error if generation fails
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Parse the role names used on the chat RPC
    pub fn from_wire(role: &str) -> Result<Self> {
        match role {
            "human" => Ok(Role::User),
            "ai" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(LlmGateError::invalid_request(format!(
                "unknown role '{}', expected human, ai or system",
                other
            ))),
        }
    }
}

/// One conversation turn as sent to a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
    /// Base64 encoded images attached to the turn
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start generating a reply to `messages`
    async fn stream_chat(&self, messages: Vec<ProviderMessage>) -> Result<TokenStream>;
}

/// Build the provider named in the settings
pub fn create_provider(settings: &WorkerSettings) -> Result<Arc<dyn ChatProvider>> {
    match settings.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            &settings.backend_url,
            &settings.model_name,
        )?)),
        other => Err(LlmGateError::config(format!("unsupported provider: {}", other))),
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ProviderMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Client for a local or remote Ollama server
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmGateError::provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Decode one NDJSON line; `Ok(None)` for blank lines
fn parse_line(line: &[u8]) -> Result<Option<OllamaChunk>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| LlmGateError::provider(format!("Malformed stream line: {}", e)))?;
    if let Some(error) = chunk.error {
        return Err(LlmGateError::provider(error));
    }
    Ok(Some(chunk))
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn stream_chat(&self, messages: Vec<ProviderMessage>) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };

        debug!(model = %self.model, turns = messages.len(), "Sending chat request to Ollama");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmGateError::provider(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmGateError::provider(format!(
                "Ollama returned {}: {}",
                status,
                error_body.trim()
            )));
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(bytes) = stream.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmGateError::provider(format!("Stream interrupted: {}", e))))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    match parse_line(&line) {
                        Ok(Some(chunk)) => {
                            let content = chunk.message.map(|m| m.content).unwrap_or_default();
                            if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                                debug!("Chat stream receiver dropped");
                                return;
                            }
                            if chunk.done {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("Ollama stream failed: {}", e);
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // A final line without a trailing newline
            match parse_line(&buffer) {
                Ok(Some(chunk)) => {
                    let content = chunk.message.map(|m| m.content).unwrap_or_default();
                    if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                        return;
                    }
                    if chunk.done {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            warn!("Ollama stream ended before the final chunk");
            let _ = tx
                .send(Err(LlmGateError::provider(
                    "Stream ended before the reply was complete",
                )))
                .await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
