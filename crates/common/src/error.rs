//! Common error types for llmgate
//!
//! This module defines all error types used across the gateway, the model
//! workers and the process supervisor.
//! All errors are convertible to gRPC status codes for proper error propagation.

use std::net::AddrParseError;
use thiserror::Error;

/// Main error type for llmgate
#[derive(Error, Debug)]
pub enum LlmGateError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The service registry could not be queried
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The registry reported no services for a group
    #[error("No services found in registry group {group}")]
    NoServicesFound { group: String },

    /// A connection handle for a discovered service could not be established
    #[error("Failed to connect to service {service}: {reason}")]
    Connect { service: String, reason: String },

    /// Malformed chat request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No backend is known for the requested model
    #[error("Model {model} not found")]
    ModelNotFound { model: String },

    /// A chunk could not be delivered to the caller
    #[error("Failed to forward response: {0}")]
    ForwardFailed(String),

    /// The backend terminated its stream with an error
    #[error("Backend stream error: {0}")]
    BackendStream(tonic::Status),

    /// A model provider (e.g. Ollama) failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// A backend process could not be spawned
    #[error("Failed to spawn {instance}: {reason}")]
    SpawnFailed { instance: String, reason: String },

    /// Sending a signal to a managed process failed
    #[error("Signal error: {0}")]
    Signal(String),

    /// gRPC communication errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// gRPC transport errors
    #[error("gRPC transport error: {0}")]
    GrpcTransport(#[from] tonic::transport::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AddrParseError> for LlmGateError {
    fn from(err: AddrParseError) -> Self {
        LlmGateError::Parse(err.to_string())
    }
}

impl LlmGateError {
    /// Convert error to gRPC status code
    pub fn to_status(&self) -> tonic::Status {
        match self {
            LlmGateError::Grpc(status) => status.clone(),
            LlmGateError::BackendStream(status) => status.clone(),
            LlmGateError::GrpcTransport(_) => tonic::Status::unavailable("Transport error"),
            LlmGateError::Config(msg) => {
                tonic::Status::internal(format!("Configuration error: {}", msg))
            }
            LlmGateError::RegistryUnavailable(msg) => {
                tonic::Status::unavailable(format!("Registry unavailable: {}", msg))
            }
            LlmGateError::NoServicesFound { group } => {
                tonic::Status::not_found(format!("No services found in group {}", group))
            }
            LlmGateError::Connect { service, reason } => {
                tonic::Status::unavailable(format!("Service {} unreachable: {}", service, reason))
            }
            LlmGateError::InvalidRequest(msg) => {
                tonic::Status::invalid_argument(format!("Invalid request: {}", msg))
            }
            LlmGateError::ModelNotFound { model } => {
                tonic::Status::not_found(format!("model {} not found", model))
            }
            LlmGateError::ForwardFailed(msg) => {
                tonic::Status::aborted(format!("Failed to forward response: {}", msg))
            }
            LlmGateError::Provider(msg) => {
                tonic::Status::unavailable(format!("Provider error: {}", msg))
            }
            LlmGateError::SpawnFailed { instance, reason } => {
                tonic::Status::internal(format!("Failed to spawn {}: {}", instance, reason))
            }
            LlmGateError::Signal(msg) => tonic::Status::internal(format!("Signal error: {}", msg)),
            LlmGateError::Serialization(err) => {
                tonic::Status::internal(format!("Serialization error: {}", err))
            }
            LlmGateError::Io(err) => tonic::Status::internal(format!("I/O error: {}", err)),
            LlmGateError::Parse(msg) => {
                tonic::Status::invalid_argument(format!("Parse error: {}", msg))
            }
            LlmGateError::Internal(msg) => tonic::Status::internal(msg.clone()),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        LlmGateError::Config(msg.into())
    }

    /// Create a registry unavailable error
    pub fn registry(msg: impl Into<String>) -> Self {
        LlmGateError::RegistryUnavailable(msg.into())
    }

    /// Create a connection error for a named service
    pub fn connect(service: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmGateError::Connect {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        LlmGateError::InvalidRequest(msg.into())
    }

    /// Create a model not found error
    pub fn model_not_found(model: impl Into<String>) -> Self {
        LlmGateError::ModelNotFound {
            model: model.into(),
        }
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        LlmGateError::Provider(msg.into())
    }

    /// Create a spawn failure for an instance
    pub fn spawn_failed(instance: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmGateError::SpawnFailed {
            instance: instance.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LlmGateError::Config(_) => "config",
            LlmGateError::RegistryUnavailable(_) => "registry_unavailable",
            LlmGateError::NoServicesFound { .. } => "no_services_found",
            LlmGateError::Connect { .. } => "connect",
            LlmGateError::InvalidRequest(_) => "invalid_request",
            LlmGateError::ModelNotFound { .. } => "model_not_found",
            LlmGateError::ForwardFailed(_) => "forward_failed",
            LlmGateError::BackendStream(_) => "backend_stream",
            LlmGateError::Provider(_) => "provider",
            LlmGateError::SpawnFailed { .. } => "spawn_failed",
            LlmGateError::Signal(_) => "signal",
            LlmGateError::Grpc(_) => "grpc",
            LlmGateError::GrpcTransport(_) => "grpc_transport",
            LlmGateError::Serialization(_) => "serialization",
            LlmGateError::Io(_) => "io",
            LlmGateError::Parse(_) => "parse",
            LlmGateError::Internal(_) => "internal",
        }
    }
}

impl From<LlmGateError> for tonic::Status {
    fn from(err: LlmGateError) -> Self {
        err.to_status()
    }
}

/// Result type alias for llmgate operations
pub type Result<T> = std::result::Result<T, LlmGateError>;
