//! The network boundary.
//!
//! The coordinator calls a [`Transport`] exactly once per coalesced request.
//! Retries and backoff, if any, belong to the transport implementation.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::params::QueryParams;

/// Errors a transport can report.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to reach the server
    #[error("Connection failed to '{url}': {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the configured timeout
    #[error("Request timeout after {duration}s")]
    Timeout { duration: u64 },

    /// Server answered with a non-success status
    #[error("Server returned {status}")]
    Status { status: u16, body: Option<Value> },

    /// Response body was not valid JSON
    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// The raw response that came with the error, if the server sent one.
    pub fn response(&self) -> Option<&Value> {
        match self {
            TransportError::Status { body, .. } => body.as_ref(),
            TransportError::Connection { .. }
            | TransportError::Timeout { .. }
            | TransportError::Decode(_) => None,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request against `endpoint` with `params` and return the
    /// decoded response body.
    async fn perform_request(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Value, TransportError>;
}
