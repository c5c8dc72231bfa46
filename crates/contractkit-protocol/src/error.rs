//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building contracts or encoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Two endpoints registered under the same name.
    #[error("duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),

    /// Two events registered under the same name in one event set.
    #[error("duplicate event name: {0}")]
    DuplicateEvent(String),

    /// Endpoint path is not root-relative.
    #[error("endpoint {name}: path {path:?} must start with '/'")]
    InvalidPath { name: String, path: String },

    /// Method name is not one of GET, POST, PUT, DELETE or PATCH.
    #[error("unknown HTTP method: {0}")]
    UnknownMethod(String),

    /// Trailing path segments are not described by a tuple schema.
    #[error("endpoint {name}: additional paths must be a tuple schema")]
    InvalidAdditionalPaths { name: String },

    /// Failed to serialize or deserialize a message.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Empty message received.
    #[error("empty message")]
    EmptyMessage,
}
