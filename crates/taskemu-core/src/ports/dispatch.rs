//! Dispatcher port: one outbound call per attempt.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DispatchTarget;

/// Turns a dispatch target into one outbound HTTP call.
///
/// Returns the response status code, or
/// [`DISPATCH_FAILED`](crate::domain::DISPATCH_FAILED) when no response was
/// received (connection error, timeout, bad request). Never errors otherwise.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, target: &DispatchTarget, deadline: Duration) -> i32;
}
