//! Request-boundary fault isolation
//!
//! Handlers never panic on purpose; a panic that escapes anyway is caught here,
//! logged, and turned into a generic internal error for that one request.

use crate::error::{LlmGateError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Message returned to callers when a handler panicked
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Run a request future, converting a panic into [`LlmGateError::Internal`]
pub async fn isolate<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            error!(panic = %panic_message(panic.as_ref()), "Request handler panicked");
            Err(LlmGateError::Internal(INTERNAL_ERROR_MESSAGE.to_string()))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
