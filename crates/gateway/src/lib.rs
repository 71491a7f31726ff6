//! llmgate gateway
//!
//! Stateless front door routing streamed chat requests to the model service
//! named in each request, plus a small info service listing available models.

pub mod backend_client;
pub mod info;
pub mod model_clients;
pub mod router;

#[cfg(test)]
mod testing;

pub use backend_client::{BackendClient, BackendConnector, ChatBackend, ChunkStream, GrpcConnector};
pub use info::GatewayInfoService;
pub use model_clients::ModelClientMap;
pub use router::Router;
