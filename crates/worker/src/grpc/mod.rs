//! gRPC chat service of the worker

pub mod server;

pub use server::ChatServer;
