//! llmgate Protocol Buffers
//!
//! Generated by tonic-build from `proto/chat.proto` and `proto/gateway.proto`.

/// Streaming chat service implemented by model workers and by the gateway router.
pub mod chat {
    tonic::include_proto!("chat");
}

/// Gateway metadata service.
pub mod gateway {
    tonic::include_proto!("gateway");
}

pub use chat::chat_service_client::ChatServiceClient;
pub use chat::chat_service_server::{ChatService, ChatServiceServer};
pub use chat::{ChatMessage, ChatRequest, ChatResponse};
pub use gateway::gateway_service_client::GatewayServiceClient;
pub use gateway::gateway_service_server::{GatewayService, GatewayServiceServer};
pub use gateway::{GetInfoRequest, GetInfoResponse};
