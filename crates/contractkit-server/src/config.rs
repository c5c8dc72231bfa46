//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use contractkit_core::{IntoSchema, SchemaRef};
use contractkit_protocol::ApiInfo;

/// Default route of the WebSocket endpoint.
pub const DEFAULT_SOCKET_PATH: &str = "/socket";

/// Default route of the documentation page.
pub const DEFAULT_DOCS_PATH: &str = "/docs";

/// Where and how the API documentation is served.
#[derive(Debug, Clone)]
pub struct DocsConfig {
    /// HTML page route; the document is served at `{path}.json`.
    pub path: String,

    /// Required to serve docs. Missing info is a configuration error.
    pub info: Option<ApiInfo>,
}

impl DocsConfig {
    pub fn new(info: ApiInfo) -> Self {
        Self {
            path: DEFAULT_DOCS_PATH.to_string(),
            info: Some(info),
        }
    }

    /// Builder: set the page route.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Route of the OpenAPI document.
    pub fn json_path(&self) -> String {
        format!("{}.json", self.path.trim_end_matches('/'))
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: IpAddr,

    /// Port to bind; 0 picks a free port.
    pub port: u16,

    /// Prefix of every endpoint route.
    pub base_path: String,

    /// Strip validation diagnostics from 400 responses.
    pub obfuscate: bool,

    /// Schema checked against the headers of every request before the
    /// endpoint channels; its output is handed to middleware.
    pub middleware_headers: Option<SchemaRef>,

    /// Serve the OpenAPI document and page when set.
    pub docs: Option<DocsConfig>,

    /// Route of the WebSocket endpoint.
    pub socket_path: String,

    /// Maximum accepted request body, in bytes.
    pub request_body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_path: String::new(),
            obfuscate: false,
            middleware_headers: None,
            docs: None,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            request_body_limit: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration binding `bind_address:port`.
    pub fn new(bind_address: IpAddr, port: u16) -> Self {
        Self {
            bind_address,
            port,
            ..Default::default()
        }
    }

    /// Builder: set the bind address.
    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// Builder: set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set the base path.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Builder: set obfuscation.
    pub fn with_obfuscate(mut self, obfuscate: bool) -> Self {
        self.obfuscate = obfuscate;
        self
    }

    /// Builder: set the middleware header schema.
    pub fn with_middleware_headers(mut self, schema: impl IntoSchema) -> Self {
        self.middleware_headers = Some(schema.into_schema());
        self
    }

    /// Builder: serve docs.
    pub fn with_docs(mut self, docs: DocsConfig) -> Self {
        self.docs = Some(docs);
        self
    }

    /// Builder: set the WebSocket route.
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Builder: set the request body limit.
    pub fn with_request_body_limit(mut self, limit: usize) -> Self {
        self.request_body_limit = limit;
        self
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
