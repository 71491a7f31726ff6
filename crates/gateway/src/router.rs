//! Request routing and stream forwarding
//!
//! This module resolves a chat request to the backend serving its model and
//! relays the backend's streamed reply to the caller chunk by chunk.

use crate::backend_client::{BackendConnector, ChatBackend, ChunkStream};
use crate::model_clients::ModelClientMap;
use futures::StreamExt;
use llmgate_common::boundary::isolate;
use llmgate_common::error::{LlmGateError, Result};
use llmgate_common::{ServiceRegistry, METRICS};
use llmgate_proto::{ChatRequest, ChatResponse, ChatService};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Chunks held between the backend and the caller; one keeps forwarding in lockstep
const FORWARD_CHANNEL_CAPACITY: usize = 1;

type ChunkSender = mpsc::Sender<std::result::Result<ChatResponse, Status>>;

/// Router for distributing chat requests across model backends.
///
/// Holds nothing but the immutable client map, so it is cheap to clone and
/// safe to share between any number of concurrent calls.
#[derive(Clone)]
pub struct Router {
    clients: Arc<ModelClientMap>,
}

impl Router {
    /// Create a router over an already built client map
    pub fn new(clients: Arc<ModelClientMap>) -> Self {
        Self { clients }
    }

    /// Discover the models of `group` and build a router over them
    pub async fn connect(
        registry: &dyn ServiceRegistry,
        connector: &dyn BackendConnector,
        group: &str,
    ) -> Result<Self> {
        let clients = ModelClientMap::build(registry, connector, group).await?;
        Ok(Self::new(Arc::new(clients)))
    }

    pub fn clients(&self) -> &Arc<ModelClientMap> {
        &self.clients
    }

    /// Validate a request and find the backend serving its model
    pub fn resolve(&self, request: &ChatRequest) -> Result<Arc<dyn ChatBackend>> {
        if request.messages.is_empty() {
            return Err(LlmGateError::invalid_request("request contains no messages"));
        }
        if request.model.is_empty() {
            return Err(LlmGateError::invalid_request("model name is empty"));
        }

        self.clients
            .get(&request.model)
            .cloned()
            .ok_or_else(|| LlmGateError::model_not_found(&request.model))
    }

    fn reject(&self, err: LlmGateError) -> Status {
        METRICS
            .gateway
            .chat_requests_failed
            .with_label_values(&[err.kind()])
            .inc();
        warn!("Rejected chat request: {}", err);
        err.to_status()
    }
}

/// Relay every chunk of `backend` to `tx` in arrival order.
///
/// Returns the number of chunks forwarded. The backend stream is owned here and
/// dropped on every return path, which cancels the backend call.
async fn forward(mut backend: ChunkStream, tx: &ChunkSender) -> Result<u64> {
    let mut forwarded = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                return Err(LlmGateError::ForwardFailed("caller disconnected".to_string()));
            }
            next = backend.next() => next,
        };

        match next {
            None => return Ok(forwarded),
            Some(Ok(chunk)) => {
                tx.send(Ok(chunk))
                    .await
                    .map_err(|_| LlmGateError::ForwardFailed("caller disconnected".to_string()))?;
                forwarded += 1;
                METRICS.gateway.chunks_forwarded_total.inc();
            }
            Some(Err(status)) => return Err(LlmGateError::BackendStream(status)),
        }
    }
}

#[tonic::async_trait]
impl ChatService for Router {
    type ChatStream = ReceiverStream<std::result::Result<ChatResponse, Status>>;

    async fn chat(
        &self,
        request: Request<ChatRequest>,
    ) -> std::result::Result<Response<Self::ChatStream>, Status> {
        METRICS.gateway.chat_requests_total.inc();
        let request = request.into_inner();
        let request_id = Uuid::new_v4();
        let span = info_span!("chat", %request_id, model = %request.model);

        let backend = self.resolve(&request).map_err(|e| self.reject(e))?;
        debug!(
            parent: &span,
            messages = request.messages.len(),
            "Routing chat request"
        );

        let stream = isolate(backend.open_stream(request))
            .instrument(span.clone())
            .await
            .map_err(|e| self.reject(e))?;

        let (tx, rx) = mpsc::channel(FORWARD_CHANNEL_CAPACITY);
        tokio::spawn(
            async move {
                let started = Instant::now();
                METRICS.gateway.active_streams.inc();

                match isolate(forward(stream, &tx)).await {
                    Ok(chunks) => info!(chunks, "Chat stream completed"),
                    Err(LlmGateError::ForwardFailed(reason)) => {
                        METRICS
                            .gateway
                            .chat_requests_failed
                            .with_label_values(&["forward_failed"])
                            .inc();
                        warn!("Stopped forwarding: {}", reason);
                    }
                    Err(err) => {
                        METRICS
                            .gateway
                            .chat_requests_failed
                            .with_label_values(&[err.kind()])
                            .inc();
                        warn!("Chat stream failed: {}", err);
                        let _ = tx.send(Err(err.to_status())).await;
                    }
                }

                METRICS.gateway.active_streams.dec();
                METRICS
                    .gateway
                    .stream_duration
                    .observe(started.elapsed().as_secs_f64());
            }
            .instrument(span),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat_request, ScriptedBackend};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tonic::Code;

    fn router_with(backends: &[Arc<ScriptedBackend>]) -> Router {
        let map = ModelClientMap::from_clients(
            backends
                .iter()
                .map(|b| (b.name.clone(), b.clone() as Arc<dyn ChatBackend>)),
        );
        Router::new(Arc::new(map))
    }

    async fn collect(router: &Router, request: ChatRequest) -> (Vec<ChatResponse>, Option<Status>) {
        let mut stream = router
            .chat(Request::new(request))
            .await
            .unwrap()
            .into_inner();

        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => chunks.push(chunk),
                Err(status) => return (chunks, Some(status)),
            }
        }
        (chunks, None)
    }

    fn contents(chunks: &[ChatResponse]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_routes_to_matching_backend_only() {
        let llama = Arc::new(ScriptedBackend::new("llama2-svc", &["Hel", "lo"]));
        let mistral = Arc::new(ScriptedBackend::new("mistral-svc", &["Bon", "jour"]));
        let router = router_with(&[llama.clone(), mistral.clone()]);

        let (chunks, error) = collect(&router, chat_request("mistral-svc", "hi")).await;

        assert!(error.is_none());
        assert_eq!(contents(&chunks), vec!["Bon", "jour"]);
        assert!(chunks.iter().all(|c| c.model == "mistral-svc"));
        assert_eq!(mistral.calls(), 1);
        assert_eq!(llama.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_a_backend() {
        let llama = Arc::new(ScriptedBackend::new("llama2-svc", &["x"]));
        let router = router_with(&[llama.clone()]);

        let empty_model = router
            .chat(Request::new(chat_request("", "hi")))
            .await
            .unwrap_err();
        assert_eq!(empty_model.code(), Code::InvalidArgument);
        assert!(empty_model.message().contains("model name is empty"));

        let mut no_messages = chat_request("llama2-svc", "hi");
        no_messages.messages.clear();
        let no_messages = router.chat(Request::new(no_messages)).await.unwrap_err();
        assert_eq!(no_messages.code(), Code::InvalidArgument);
        assert!(no_messages.message().contains("no messages"));

        let unknown = router
            .chat(Request::new(chat_request("gpt-svc", "hi")))
            .await
            .unwrap_err();
        assert_eq!(unknown.code(), Code::NotFound);
        assert!(unknown.message().contains("gpt-svc"));

        assert_eq!(llama.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_terminates_stream_after_chunks() {
        let mut backend = ScriptedBackend::new("llama2-svc", &["partial"]);
        backend.trailing_error = Some(Status::unavailable("model crashed"));
        let router = router_with(&[Arc::new(backend)]);

        let (chunks, error) = collect(&router, chat_request("llama2-svc", "hi")).await;

        assert_eq!(contents(&chunks), vec!["partial"]);
        let error = error.expect("terminal error");
        assert_eq!(error.code(), Code::Unavailable);
        assert_eq!(error.message(), "model crashed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_keep_their_own_order() {
        let mut llama = ScriptedBackend::new("llama2-svc", &["l0", "l1", "l2", "l3", "l4"]);
        llama.chunk_delay = Duration::from_millis(3);
        let mut mistral = ScriptedBackend::new("mistral-svc", &["m0", "m1", "m2", "m3", "m4"]);
        mistral.chunk_delay = Duration::from_millis(2);
        let router = router_with(&[Arc::new(llama), Arc::new(mistral)]);

        let mut handles = Vec::new();
        for i in 0..8 {
            let router = router.clone();
            let model = if i % 2 == 0 { "llama2-svc" } else { "mistral-svc" };
            handles.push(tokio::spawn(async move {
                let (chunks, error) = collect(&router, chat_request(model, "hi")).await;
                (model, chunks, error)
            }));
        }

        for handle in handles {
            let (model, chunks, error) = handle.await.unwrap();
            assert!(error.is_none());
            let prefix = &model[..1];
            let expected: Vec<String> = (0..5).map(|i| format!("{}{}", prefix, i)).collect();
            assert_eq!(contents(&chunks), expected);
            assert!(chunks.iter().all(|c| c.model == model));
        }
    }

    #[tokio::test]
    async fn test_caller_disconnect_closes_backend_stream() {
        let mut backend = ScriptedBackend::new("llama2-svc", &["first"]);
        backend.never_ends = true;
        let closed = backend.closed.clone();
        let router = router_with(&[Arc::new(backend)]);

        let mut stream = router
            .chat(Request::new(chat_request("llama2-svc", "hi")))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(stream.next().await.unwrap().unwrap().content, "first");
        assert!(!closed.load(Ordering::SeqCst));

        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !closed.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend stream closed after caller disconnect");
    }

    #[tokio::test]
    async fn test_backend_panic_is_internal_error() {
        let mut backend = ScriptedBackend::new("llama2-svc", &[]);
        backend.panics = true;
        let router = router_with(&[Arc::new(backend)]);

        let status = router
            .chat(Request::new(chat_request("llama2-svc", "hi")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);

        // The router keeps serving after a panicking request
        let status = router
            .chat(Request::new(chat_request("", "hi")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_discovered_services_are_routable() {
        use crate::testing::MapConnector;
        use llmgate_common::StaticRegistry;

        let registry = StaticRegistry::new();
        registry.add_service("MODEL_GROUP", "llama2-svc");
        registry.add_service("MODEL_GROUP", "mistral-svc");

        let mut connector = MapConnector::default();
        for name in ["llama2-svc", "mistral-svc"] {
            connector
                .backends
                .insert(name.to_string(), Arc::new(ScriptedBackend::new(name, &[name])));
        }

        let router = Router::connect(&registry, &connector, "MODEL_GROUP")
            .await
            .unwrap();
        assert_eq!(router.clients().models(), vec!["llama2-svc", "mistral-svc"]);

        for name in ["llama2-svc", "mistral-svc"] {
            let (chunks, error) = collect(&router, chat_request(name, "hi")).await;
            assert!(error.is_none());
            assert_eq!(contents(&chunks), vec![name]);
        }
    }
}
