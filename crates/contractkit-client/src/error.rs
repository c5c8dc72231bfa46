//! Client error types.
//!
//! [`ClientError`] covers everything the caller can get wrong or the local
//! machine can fail at. What the remote side answers is never an error
//! here; it is a [`CallOutcome`](crate::CallOutcome).

use contractkit_core::SchemaError;
use contractkit_protocol::{Channel, ProtocolError};
use contractkit_server::ServerError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No endpoint with this name in the registry.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Caller input failed the channel schema.
    #[error("invalid {channel} input: {error}")]
    InvalidInput {
        channel: Channel,
        error: SchemaError,
    },

    /// A trailing path value cannot be a single path segment.
    #[error("path segment {index} cannot be sent as a single segment: {segment:?}")]
    InvalidPathSegment { index: usize, segment: String },

    /// The endpoint needs a converter the suite was not given.
    #[error("endpoint {endpoint} needs a {channel} converter")]
    MissingConverter { endpoint: String, channel: Channel },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("socket error: {0}")]
    Socket(Box<tungstenite::Error>),

    /// The socket connection is gone.
    #[error("socket closed")]
    SocketClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A CLI call came back as a failure.
    #[error("call failed: {0}")]
    CallFailed(String),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn invalid_input(channel: Channel, error: SchemaError) -> Self {
        Self::InvalidInput { channel, error }
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Socket(Box::new(err))
    }
}

/// Failure of the transport itself: nothing usable came back.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
