//! The demo contract served and called by the CLI.
//!
//! One endpoint, `getPerson` at `GET /people/:0/:1`, guarded by a fixed
//! authorization header, and a chat socket that echoes every
//! `sendMessage` back to its sender as a `message`.

use chrono::Utc;
use contractkit_core::schema;
use contractkit_protocol::{ApiInfo, Endpoint, Registry, SocketDefinition};
use contractkit_server::{
    HandlerRequest, HandlerResult, HttpServer, ServerConfig, ServerError, SocketContext,
    SocketServer, Success,
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ClientResult;

/// The only accepted `authorization` header value.
pub const AUTHORIZATION: &str = "1234567890";

pub const FIRST_NAMES: [&str; 3] = ["Bob", "Douglas", "Jeremy"];
pub const LAST_NAMES: [&str; 3] = ["Smith", "Jones", "Williams"];

/// Registry of the demo HTTP contract.
pub fn registry() -> ClientResult<Registry> {
    let registry = Registry::builder()
        .endpoint(
            "getPerson",
            Endpoint::get("/people", schema::object().field("success", schema::boolean()))
                .with_summary("Look up a person by first and last name")
                .with_tag("people")
                .with_additional_paths(
                    schema::tuple()
                        .item(schema::enumeration(FIRST_NAMES))
                        .item(schema::enumeration(LAST_NAMES)),
                )
                .with_headers(schema::object().field("authorization", schema::literal(AUTHORIZATION))),
        )
        .build()?;
    Ok(registry)
}

/// Socket contract of the demo chat.
pub fn socket_definition() -> ClientResult<SocketDefinition> {
    let definition = SocketDefinition::builder()
        .server_event(
            "message",
            schema::object()
                .field("content", schema::string())
                .field("timestamp", schema::number()),
        )
        .client_event("sendMessage", schema::object().field("content", schema::string()))
        .build()?;
    Ok(definition)
}

pub fn api_info() -> ApiInfo {
    ApiInfo::new("contractkit demo", env!("CARGO_PKG_VERSION"))
        .with_description("People lookup and an echo chat")
}

async fn get_person(request: HandlerRequest) -> HandlerResult {
    debug!(paths = ?request.additional_paths, "getPerson");
    Ok(Success::ok(json!({ "success": true })))
}

async fn echo(context: SocketContext, data: Value) {
    let content = data["content"].as_str().unwrap_or_default();
    let reply = json!({
        "content": format!("Echo: {}", content),
        "timestamp": Utc::now().timestamp_millis(),
    });
    if let Err(e) = context.emit("message", reply) {
        warn!(session = %context.session_id(), error = %e, "Echo failed");
    }
}

/// Builds the demo server with both contracts bound.
pub fn server(config: ServerConfig) -> ClientResult<HttpServer> {
    let socket = SocketServer::builder(socket_definition()?)
        .on("sendMessage", echo)
        .build()
        .map_err(ServerError::from)?;
    let server = HttpServer::builder(registry()?, config)
        .bind("getPerson", get_person)
        .socket(socket)
        .build()?;
    Ok(server)
}
