//! Shared error types.

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the API on non-2xx responses (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: Option<String>,
}

/// Attempt to parse an API error body into a user-facing message.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    parsed.detail.filter(|detail| !detail.trim().is_empty())
}

fn http_message(body: &str) -> String {
    try_error_detail(body).unwrap_or_else(|| body.to_string())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {}", http_message(.body))]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of the streaming socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport closed")]
    Closed,
}

/// Why an outbound envelope was not queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,
    #[error("connection was shut down")]
    Disconnected,
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}
