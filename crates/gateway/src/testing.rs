//! Scripted backends for unit tests

use crate::backend_client::{BackendConnector, ChatBackend, ChunkStream};
use async_trait::async_trait;
use futures::StreamExt;
use llmgate_common::error::{LlmGateError, Result};
use llmgate_proto::{ChatMessage, ChatRequest, ChatResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;

/// Backend emitting a fixed list of chunks, optionally followed by an error
pub struct ScriptedBackend {
    pub name: String,
    pub chunks: Vec<String>,
    pub chunk_delay: Duration,
    pub trailing_error: Option<Status>,
    pub never_ends: bool,
    pub panics: bool,
    pub calls: AtomicUsize,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub fn new(name: &str, chunks: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            chunk_delay: Duration::ZERO,
            trailing_error: None,
            never_ends: false,
            panics: false,
            calls: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Sets its flag when the stream owning it is dropped
struct CloseGuard(Arc<AtomicBool>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("scripted backend panic");
        }

        let model = request.model;
        let delay = self.chunk_delay;
        let mut items: Vec<std::result::Result<ChatResponse, Status>> = self
            .chunks
            .iter()
            .map(|c| {
                Ok(ChatResponse {
                    content: c.clone(),
                    model: model.clone(),
                })
            })
            .collect();
        if let Some(status) = &self.trailing_error {
            items.push(Err(status.clone()));
        }

        let guard = CloseGuard(self.closed.clone());
        let never_ends = self.never_ends;
        let stream = futures::stream::unfold(
            (items.into_iter(), guard),
            move |(mut items, guard)| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match items.next() {
                    Some(item) => Some((item, (items, guard))),
                    None if never_ends => {
                        std::future::pending::<()>().await;
                        None
                    }
                    None => None,
                }
            },
        );
        Ok(stream.boxed())
    }
}

/// Connector handing out pre-built backends by service name
#[derive(Default)]
pub struct MapConnector {
    pub backends: HashMap<String, Arc<ScriptedBackend>>,
    pub failing: Option<String>,
    pub attempts: AtomicUsize,
}

#[async_trait]
impl BackendConnector for MapConnector {
    async fn connect(&self, service: &str) -> Result<Arc<dyn ChatBackend>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.as_deref() == Some(service) {
            return Err(LlmGateError::connect(service, "connection refused"));
        }
        let backend: Arc<dyn ChatBackend> = self
            .backends
            .get(service)
            .cloned()
            .map(|b| b as Arc<dyn ChatBackend>)
            .unwrap_or_else(|| Arc::new(ScriptedBackend::new(service, &[])));
        Ok(backend)
    }
}

pub fn chat_request(model: &str, text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage {
            role: "human".to_string(),
            content: text.to_string(),
            bin: Vec::new(),
        }],
        model: model.to_string(),
    }
}
