//! Server side of contractkit: request dispatch and socket events.
//!
//! An [`HttpServer`] is built from a [`Registry`](contractkit_protocol::Registry)
//! and one handler per endpoint. Building checks the whole contract (every
//! endpoint bound, no route collisions, converters where the wire cannot
//! carry a schema directly) before anything binds.
//!
//! # Example
//!
//! ```rust,no_run
//! use contractkit_core::schema;
//! use contractkit_protocol::{Endpoint, Registry};
//! use contractkit_server::{HttpServer, ServerConfig, StopMode, Success};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::builder()
//!         .endpoint("health", Endpoint::get("/health", schema::any()))
//!         .build()?;
//!
//!     let mut server = HttpServer::builder(registry, ServerConfig::default())
//!         .bind("health", |_request| async { Ok(Success::ok(json!({ "ok": true }))) })
//!         .build()?;
//!
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop(StopMode::Graceful).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod server;
mod shutdown;
mod socket;

pub use config::{DEFAULT_DOCS_PATH, DEFAULT_SOCKET_PATH, DocsConfig, ServerConfig};
pub use dispatch::{
    Binding, Failure, Handler, HandlerFuture, HandlerRequest, HandlerResult, Middleware,
    MiddlewareFuture, MiddlewareRequest, Success, handler_fn, middleware_fn,
};
pub use error::{ServerError, ServerResult, SocketError};
pub use server::{HttpServer, HttpServerBuilder};
pub use shutdown::{StopListener, StopMode, StopSignal, terminate_signal};
pub use socket::{
    SocketContext, SocketHandler, SocketHandlerFuture, SocketServer, SocketServerBuilder,
};
