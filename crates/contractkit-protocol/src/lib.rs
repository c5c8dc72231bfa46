//! Contract definitions shared by contractkit servers and clients.
//!
//! A contract is declared once, as a [`Registry`] of named [`Endpoint`]s
//! and/or a [`SocketDefinition`], and handed to both sides. Everything the
//! two sides must agree on lives here:
//!
//! - route derivation for trailing path segments ([`route`])
//! - the converter hooks between wire strings and schema inputs
//!   ([`converter`])
//! - the query, header and error-body encodings ([`wire`])
//! - socket message framing ([`socket`])
//! - OpenAPI generation ([`docs`])
//!
//! # Example
//!
//! ```rust
//! use contractkit_core::schema;
//! use contractkit_protocol::{Endpoint, Registry};
//!
//! let registry = Registry::builder()
//!     .endpoint(
//!         "getPerson",
//!         Endpoint::get("/people", schema::object().field("success", schema::boolean()))
//!             .with_additional_paths(
//!                 schema::tuple()
//!                     .item(schema::enumeration(["Bob", "Douglas"]))
//!                     .item(schema::enumeration(["Smith", "Jones"])),
//!             ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let endpoint = registry.get("getPerson").unwrap();
//! assert_eq!(endpoint.route("/api"), "/api/people/:0/:1");
//! ```

pub mod converter;
pub mod docs;
pub mod endpoint;
mod error;
pub mod registry;
pub mod route;
pub mod socket;
pub mod wire;

pub use converter::{Converter, Converters};
pub use docs::{ApiInfo, json_schema, openapi_document};
pub use endpoint::{Channel, Endpoint, Method};
pub use error::{ProtocolError, ProtocolResult};
pub use registry::{Registry, RegistryBuilder};
pub use socket::{EventSet, Inbound, SocketDefinition, SocketDefinitionBuilder, SocketMessage};
pub use wire::{ErrorBody, ErrorKind};

/// Maximum socket message size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Content type of every body exchanged by contractkit.
pub const JSON_CONTENT_TYPE: &str = "application/json";
