//! Worker serving chat over gRPC against a mocked Ollama server

use futures::StreamExt;
use llmgate_proto::{ChatMessage, ChatRequest, ChatServiceClient, ChatServiceServer};
use llmgate_worker::{ChatServer, OllamaProvider};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::Code;

async fn start_worker(ollama_url: &str) -> String {
    let provider = Arc::new(OllamaProvider::new(ollama_url, "llava:7b").unwrap());
    let server = ChatServer::new("llava:7b", provider, 0, 0);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(ChatServiceServer::new(server))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    format!("http://{}", addr)
}

fn request(role: &str, text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage {
            role: role.to_string(),
            content: text.to_string(),
            bin: Vec::new(),
        }],
        model: "llava:7b".to_string(),
    }
}

#[tokio::test]
async fn test_worker_relays_ollama_stream() {
    let mut ollama = mockito::Server::new_async().await;
    ollama
        .mock("POST", "/api/chat")
        .with_body(concat!(
            r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":" there"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":""},"done":true}"#,
            "\n"
        ))
        .create_async()
        .await;

    let endpoint = start_worker(&ollama.url()).await;
    let mut client = ChatServiceClient::connect(endpoint).await.unwrap();

    let mut stream = client
        .chat(request("human", "hello"))
        .await
        .unwrap()
        .into_inner();
    let mut contents = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert_eq!(chunk.model, "llava:7b");
        contents.push(chunk.content);
    }

    assert_eq!(contents, vec!["Hi", " there"]);
}

#[tokio::test]
async fn test_worker_reports_provider_failure() {
    let mut ollama = mockito::Server::new_async().await;
    ollama
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_body("out of memory")
        .create_async()
        .await;

    let endpoint = start_worker(&ollama.url()).await;
    let mut client = ChatServiceClient::connect(endpoint).await.unwrap();

    let status = client.chat(request("human", "hello")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_worker_rejects_unknown_role() {
    let ollama = mockito::Server::new_async().await;
    let endpoint = start_worker(&ollama.url()).await;
    let mut client = ChatServiceClient::connect(endpoint).await.unwrap();

    let status = client.chat(request("robot", "hello")).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}
