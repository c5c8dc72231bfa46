//! Server error types.

use std::io;

use contractkit_protocol::{Channel, Method};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while building, starting or stopping a server.
///
/// Everything except `Io` and the lifecycle variants is a contract
/// violation detected by [`HttpServerBuilder::build`](crate::HttpServerBuilder::build),
/// before anything binds.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (bind, accept).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid contract definition.
    #[error("Protocol error: {0}")]
    Protocol(#[from] contractkit_protocol::ProtocolError),

    /// Two routes normalize to the same (method, route) pair.
    #[error("Route collision: {method} {route} is claimed by both {first} and {second}")]
    RouteCollision {
        method: Method,
        route: String,
        first: String,
        second: String,
    },

    /// An endpoint of the registry has no handler.
    #[error("No handler bound for endpoint {0}")]
    MissingHandler(String),

    /// A handler is bound to a name the registry does not declare.
    #[error("Handler bound to unknown endpoint {0}")]
    UnknownEndpoint(String),

    /// A channel schema cannot take wire strings and no converter is bound.
    #[error("Endpoint {endpoint}: {channel} schema needs a converter")]
    MissingConverter { endpoint: String, channel: Channel },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// `start` called on a running server.
    #[error("Server is already running on {address}")]
    AlreadyRunning { address: String },

    /// `stop` called on a stopped server.
    #[error("Server is not running")]
    NotRunning,

    /// Socket server setup failed.
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an already running error.
    pub fn already_running(address: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            address: address.into(),
        }
    }
}

/// Errors raised by the socket layer.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Event name not declared in the relevant event set.
    #[error("Unknown socket event: {0}")]
    UnknownEvent(String),

    /// Message could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] contractkit_protocol::ProtocolError),

    /// The session is gone.
    #[error("Socket session closed")]
    Closed,
}
