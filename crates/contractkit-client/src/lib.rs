//! Client side of contractkit contracts, and the `contractkit` CLI.
//!
//! A [`ClientSuite`] calls the endpoints of a registry by name. Each call
//! is prepared without I/O ([`prepare_request`]), sent through a
//! [`Transport`] and interpreted against the response schema into a
//! [`CallOutcome`]. Caller mistakes are [`ClientError`]s; whatever the
//! server answers is an outcome.
//!
//! [`SocketClient`] is the socket counterpart: it emits client events and
//! dispatches validated server events to listeners.

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;
pub mod options;
pub mod outcome;
pub mod prepare;
pub mod socket;
pub mod suite;
pub mod transport;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError};
pub use options::{ClientOptions, OptionsOverride};
pub use outcome::{CallFailure, CallOutcome};
pub use prepare::{CallInput, PreparedRequest, prepare_request};
pub use socket::{ListenerId, SocketClient};
pub use suite::ClientSuite;
pub use transport::{
    FetchTransport, InterceptingTransport, RawResponse, RequestInterceptor, ResponseInterceptor,
    RouterTransport, Transport, TransportFuture,
};
