//! Failure reporting collaborator
//!
//! Discovery and token-exchange failures are handed to a `Diagnostics`
//! implementation together with the request and response that produced them,
//! so a host application can surface "last error" details to an operator.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::key::ConnectionKey;

/// One failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// e.g. "discovery", "request_token", "access_token".
    pub operation: String,
    pub message: String,
    /// `METHOD url` of the outbound request, if one was made.
    pub request: Option<String>,
    /// Status and body of the response, if one was received.
    pub response: Option<String>,
}

impl Failure {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            request: None,
            response: None,
        }
    }

    pub fn with_request(mut self, method: &str, url: &str) -> Self {
        self.request = Some(format!("{method} {url}"));
        self
    }

    pub fn with_response(mut self, status: u16, body: &str) -> Self {
        self.response = Some(format!("{status} {body}"));
        self
    }
}

/// Receives failures for a connection.
pub trait Diagnostics: Send + Sync {
    fn record(&self, key: &ConnectionKey, failure: Failure);

    /// Forget anything recorded for `key`.
    fn clear(&self, _key: &ConnectionKey) {}
}

/// Logs failures at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, key: &ConnectionKey, failure: Failure) {
        warn!(
            key = %key,
            operation = %failure.operation,
            request = failure.request.as_deref().unwrap_or("-"),
            response = failure.response.as_deref().unwrap_or("-"),
            "{}",
            failure.message
        );
    }

    fn clear(&self, key: &ConnectionKey) {
        info!(key = %key, "cleared recorded failures");
    }
}
