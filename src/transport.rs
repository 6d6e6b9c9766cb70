//! Outbound submission seam.
//!
//! The tracker hands each debounced session record to a
//! [`SessionTransport`]. The HTTP implementation lives in
//! [`crate::gateway`]; [`DryRunTransport`] only logs the payload.

use crate::core::session::SessionRecord;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// HTTP status code (0 when nothing was actually sent)
    pub status: u16,
    /// Response body, if it was JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl SubmitReceipt {
    pub fn ok(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Config(msg) => write!(f, "Transport config error: {msg}"),
            TransportError::Network(msg) => write!(f, "Transport network error: {msg}"),
            TransportError::Server { status, message } => {
                write!(f, "Endpoint error ({status}): {message}")
            }
            TransportError::Serialization(msg) => {
                write!(f, "Transport serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one session record to the collection endpoint.
///
/// Callers treat this as best effort: the result is logged, never retried.
pub trait SessionTransport: Send + Sync + 'static {
    fn submit(
        &self,
        record: SessionRecord,
    ) -> impl Future<Output = Result<SubmitReceipt, TransportError>> + Send;
}

/// Logs each payload instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct DryRunTransport;

impl SessionTransport for DryRunTransport {
    async fn submit(&self, record: SessionRecord) -> Result<SubmitReceipt, TransportError> {
        let payload = serde_json::to_string(&record)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        tracing::info!(%payload, "dry run: session not sent");
        Ok(SubmitReceipt::ok(0))
    }
}
