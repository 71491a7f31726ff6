//! llmgate worker
//!
//! Model worker process launched by the supervisor. It registers itself in the
//! registry under its model name and serves the streaming chat RPC by relaying
//! to a model provider.

pub mod grpc;
pub mod provider;
pub mod settings;

pub use grpc::ChatServer;
pub use provider::{create_provider, ChatProvider, OllamaProvider, ProviderMessage, Role};
pub use settings::WorkerSettings;
