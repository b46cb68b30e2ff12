//! Error types for the REST client, the push channel and the sync engine

use std::time::Duration;

use shared::ErrorCode;
use thiserror::Error;

use crate::sync::MutationKind;

/// REST client error
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Business error reported by the backend
    #[error("API error {code}: {message}")]
    Api { code: ErrorCode, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No response within the request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Timeout(_) => true,
            ClientError::Api { code, .. } => code.is_transient(),
            _ => false,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Push channel (message bus) error
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Error surfaced by [`SyncContext`](crate::SyncContext) operations
///
/// Push transport failures never show up here; the supervisor logs them and
/// falls back to polling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Loading a page failed; the previous window is left in place
    #[error("Failed to fetch orders: {0}")]
    Fetch(#[source] ClientError),

    /// An optimistic mutation was rejected and rolled back
    #[error("Failed to {kind} order {id}: {source}")]
    Mutation {
        kind: MutationKind,
        id: String,
        #[source]
        source: ClientError,
    },

    /// The context could not be built from configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// The underlying REST error, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            SyncError::Fetch(e) => Some(e),
            SyncError::Mutation { source, .. } => Some(source),
            SyncError::Config(_) => None,
        }
    }
}
