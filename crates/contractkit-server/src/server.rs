//! HTTP server: contract validation, route table and lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::handler::Handler;
use axum::http::Request;
use axum::response::{Html, Json};
use axum::routing::{MethodRouter, get};
use contractkit_protocol::{ApiInfo, Method, Registry, openapi_document, route};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{
    Binding, DispatchSettings, Dispatcher, Failure, HandlerRequest, HandlerResult, Middleware,
    MiddlewareRequest, middleware_fn,
};
use crate::error::{ServerError, ServerResult};
use crate::shutdown::{StopListener, StopMode, StopSignal};
use crate::socket::SocketServer;

/// Routes grouped by path, each with its dispatchers.
type RouteTable = Vec<(String, Vec<Arc<Dispatcher>>)>;

struct Running {
    address: SocketAddr,
    stop: StopSignal,
    task: JoinHandle<io::Result<()>>,
}

/// A server bound to one [`Registry`].
///
/// Built with [`HttpServer::builder`]; every contract violation is reported
/// by [`HttpServerBuilder::build`] before anything binds. The server is
/// stopped after building and can be started and stopped repeatedly.
pub struct HttpServer {
    config: ServerConfig,
    registry: Registry,
    routes: RouteTable,
    socket: Option<SocketServer>,
    running: Option<Running>,
}

impl HttpServer {
    /// Starts building a server for `registry`.
    pub fn builder(registry: Registry, config: ServerConfig) -> HttpServerBuilder {
        HttpServerBuilder {
            registry,
            config,
            bindings: Vec::new(),
            middleware: Vec::new(),
            socket: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The socket server mounted at `config.socket_path`, if any.
    pub fn socket(&self) -> Option<&SocketServer> {
        self.socket.as_ref()
    }

    /// Address the server listens on while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .as_ref()
            .filter(|running| !running.task.is_finished())
            .map(|running| running.address)
    }

    pub fn is_running(&self) -> bool {
        self.local_addr().is_some()
    }

    /// OpenAPI document, when docs are configured.
    pub fn openapi(&self) -> Option<Value> {
        let info = self.config.docs.as_ref()?.info.as_ref()?;
        Some(openapi_document(&self.registry, info, &self.config.base_path))
    }

    /// The complete router, for serving in-process without binding.
    pub fn router(&self) -> Router {
        self.app(&StopSignal::new())
    }

    fn app(&self, stop: &StopSignal) -> Router {
        let mut router = Router::new();
        for (path, dispatchers) in &self.routes {
            let mut method_router = MethodRouter::new();
            for dispatcher in dispatchers {
                let method = dispatcher.endpoint.method();
                let dispatcher = dispatcher.clone();
                let handler = move |request: Request<Body>| {
                    let dispatcher = dispatcher.clone();
                    async move { dispatcher.dispatch(request).await }
                };
                method_router = register(method_router, method, handler);
            }
            router = router.route(path, method_router);
        }

        if let Some(docs) = &self.config.docs
            && let Some(info) = &docs.info
        {
            let json_path = docs.json_path();
            let document = Arc::new(openapi_document(
                &self.registry,
                info,
                &self.config.base_path,
            ));
            let page = docs_page(info, &json_path);
            router = router
                .route(
                    &json_path,
                    get(move || {
                        let document = document.clone();
                        async move { Json(document.as_ref().clone()) }
                    }),
                )
                .route(&docs.path, get(move || async move { Html(page) }));
        }

        if let Some(socket) = &self.socket {
            router = router.merge(socket.router_with_stop(&self.config.socket_path, stop));
        }
        router
    }

    /// Binds and starts serving in a background task.
    ///
    /// Returns the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyRunning`] if the server is running, or
    /// an IO error if the address cannot be bound.
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        if let Some(address) = self.local_addr() {
            return Err(ServerError::already_running(address.to_string()));
        }

        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        let address = listener.local_addr()?;
        let stop = StopSignal::new();
        let app = self.app(&stop);
        let task = tokio::spawn(accept_loop(listener, app, stop.clone()));

        info!(
            address = %address,
            endpoints = self.registry.len(),
            base_path = %self.config.base_path,
            "Server listening"
        );
        self.running = Some(Running {
            address,
            stop,
            task,
        });
        Ok(address)
    }

    /// Stops the server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the server is stopped.
    pub async fn stop(&mut self, mode: StopMode) -> ServerResult<()> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;
        running.stop.stop(mode);

        match running.task.await {
            Ok(result) => result?,
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(io::Error::other(e).into()),
        }

        info!(address = %running.address, mode = ?mode, "Server stopped");
        Ok(())
    }

    /// Starts, waits for `signal`, then stops gracefully.
    pub async fn serve_until<F>(&mut self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop(StopMode::Graceful).await
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            debug!(address = %running.address, "Server dropped while running, stopping");
            running.stop.stop(StopMode::Force);
        }
    }
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.config)
            .field("routes", &self.routes.iter().map(|(path, _)| path).collect::<Vec<_>>())
            .field("running", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// Fixed method table.
fn register<H, T>(router: MethodRouter, method: Method, handler: H) -> MethodRouter
where
    H: Handler<T, ()>,
    T: 'static,
{
    match method {
        Method::Get => router.get(handler),
        Method::Post => router.post(handler),
        Method::Put => router.put(handler),
        Method::Delete => router.delete(handler),
        Method::Patch => router.patch(handler),
    }
}

/// Accepts connections until a stop is requested, then drains them
/// (graceful) or aborts them (force).
async fn accept_loop(listener: TcpListener, app: Router, stop: StopSignal) -> io::Result<()> {
    let mut connections = JoinSet::new();
    let stopped = stop.listener().stopped();
    tokio::pin!(stopped);

    let mode = loop {
        tokio::select! {
            mode = &mut stopped => break mode,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, app.clone(), stop.listener()));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    };
    drop(listener);

    debug!(connections = connections.len(), mode = ?mode, "Closing open connections");
    if mode == StopMode::Force {
        connections.abort_all();
    }
    while connections.join_next().await.is_some() {}
    Ok(())
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Serves one connection, upgrades included. A graceful stop lets the
/// request in flight finish; a forced one drops the connection.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Router, stop: StopListener) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection =
        builder.serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(app));
    tokio::pin!(connection);
    let stopped = stop.stopped();
    tokio::pin!(stopped);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        mode = &mut stopped => match mode {
            StopMode::Force => {
                debug!(peer = %peer, "Dropping connection");
                return;
            }
            StopMode::Graceful => {
                connection.as_mut().graceful_shutdown();
                connection.as_mut().await
            }
        },
    };
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

fn docs_page(info: &ApiInfo, json_path: &str) -> String {
    format!(
        r##"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.onload = () => {{
  window.ui = SwaggerUIBundle({{ url: "{url}", dom_id: "#swagger-ui" }});
}};
</script>
</body>
</html>
"##,
        title = escape_html(&info.title),
        url = escape_html(json_path),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Builder for [`HttpServer`].
pub struct HttpServerBuilder {
    registry: Registry,
    config: ServerConfig,
    bindings: Vec<(String, Binding)>,
    middleware: Vec<Middleware>,
    socket: Option<SocketServer>,
}

impl HttpServerBuilder {
    /// Binds an async handler to the endpoint `name`.
    pub fn bind<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.bind_with(name, Binding::new(f))
    }

    /// Binds a handler with converters or an obfuscation override.
    pub fn bind_with(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.bindings.push((name.into(), binding));
        self
    }

    /// Adds middleware, run in order after the middleware header schema.
    pub fn middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MiddlewareRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        self.middleware.push(middleware_fn(f));
        self
    }

    /// Mounts a socket server at `config.socket_path`.
    pub fn socket(mut self, socket: SocketServer) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Validates the bindings against the registry and builds the route
    /// table.
    ///
    /// # Errors
    ///
    /// - [`ServerError::UnknownEndpoint`] for a handler bound to a name the
    ///   registry does not declare
    /// - [`ServerError::MissingHandler`] for an endpoint without handler
    /// - [`ServerError::MissingConverter`] for a channel that needs one
    /// - [`ServerError::RouteCollision`] when two routes normalize to the
    ///   same (method, route)
    /// - [`ServerError::Config`] for docs without API info or a handler
    ///   bound twice
    pub fn build(self) -> ServerResult<HttpServer> {
        let mut bindings: HashMap<String, Binding> = HashMap::new();
        for (name, binding) in self.bindings {
            if !self.registry.contains(&name) {
                return Err(ServerError::UnknownEndpoint(name));
            }
            if bindings.contains_key(&name) {
                return Err(ServerError::config(format!("handler bound twice for {}", name)));
            }
            bindings.insert(name, binding);
        }

        let mut claimed: HashMap<(Method, String), String> = HashMap::new();
        if let Some(docs) = &self.config.docs {
            if docs.info.is_none() {
                return Err(ServerError::config("docs requested without API info"));
            }
            claimed.insert((Method::Get, route::normalize_route(&docs.path)), "docs page".into());
            claimed.insert(
                (Method::Get, route::normalize_route(&docs.json_path())),
                "docs document".into(),
            );
        }
        if self.socket.is_some() {
            claimed.insert(
                (Method::Get, route::normalize_route(&self.config.socket_path)),
                "socket".into(),
            );
        }

        let settings = DispatchSettings {
            base_path: self.config.base_path.clone(),
            obfuscate: self.config.obfuscate,
            body_limit: self.config.request_body_limit,
            middleware_headers: self.config.middleware_headers.clone(),
            middleware: self.middleware.into(),
        };

        let mut routes: RouteTable = Vec::new();
        for (name, endpoint) in self.registry.iter() {
            let binding = bindings
                .remove(name)
                .ok_or_else(|| ServerError::MissingHandler(name.to_string()))?;
            if let Some(channel) = binding.converters.missing_for(endpoint).into_iter().next() {
                return Err(ServerError::MissingConverter {
                    endpoint: name.to_string(),
                    channel,
                });
            }

            let dispatcher = Arc::new(Dispatcher::new(name, endpoint, binding, &settings));
            let key = (endpoint.method(), route::normalize_route(&dispatcher.route));
            if let Some(first) = claimed.get(&key) {
                return Err(ServerError::RouteCollision {
                    method: endpoint.method(),
                    route: dispatcher.route.clone(),
                    first: first.clone(),
                    second: name.to_string(),
                });
            }
            claimed.insert(key, name.to_string());

            debug!(endpoint = %name, method = %endpoint.method(), route = %dispatcher.route, "Route registered");
            match routes.iter_mut().find(|(path, _)| *path == dispatcher.route) {
                Some((_, entries)) => entries.push(dispatcher),
                None => routes.push((dispatcher.route.clone(), vec![dispatcher])),
            }
        }

        if self.registry.is_empty() && self.socket.is_none() {
            warn!("Server built with no endpoints and no socket");
        }

        Ok(HttpServer {
            config: self.config,
            registry: self.registry,
            routes,
            socket: self.socket,
            running: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocsConfig;
    use crate::dispatch::Success;
    use contractkit_core::schema;
    use contractkit_protocol::{Channel, Converter, Converters, Endpoint, SocketDefinition};
    use serde_json::json;

    fn ok_handler() -> impl Fn(HandlerRequest) -> std::future::Ready<HandlerResult> + Send + Sync + 'static {
        |_| std::future::ready(Ok(Success::ok(json!({ "success": true }))))
    }

    fn people_registry() -> Registry {
        Registry::builder()
            .endpoint(
                "getPerson",
                Endpoint::get("/people", schema::object().field("success", schema::boolean()))
                    .with_additional_paths(
                        schema::tuple()
                            .item(schema::enumeration(["Bob", "Douglas", "Jeremy"]))
                            .item(schema::enumeration(["Smith", "Jones", "Williams"])),
                    ),
            )
            .build()
            .unwrap()
    }

    fn local() -> ServerConfig {
        ServerConfig::default().with_port(0)
    }

    #[test]
    fn builds_with_every_handler_bound() {
        let server = HttpServer::builder(people_registry(), local())
            .bind("getPerson", ok_handler())
            .build()
            .unwrap();
        assert!(!server.is_running());
        assert_eq!(server.routes.len(), 1);
        assert_eq!(server.routes[0].0, "/people/:0/:1");
    }

    #[test]
    fn missing_handler_is_fatal() {
        let err = HttpServer::builder(people_registry(), local()).build().unwrap_err();
        assert!(matches!(err, ServerError::MissingHandler(name) if name == "getPerson"));
    }

    #[test]
    fn unknown_endpoint_is_fatal() {
        let err = HttpServer::builder(people_registry(), local())
            .bind("getPerson", ok_handler())
            .bind("getPeople", ok_handler())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownEndpoint(name) if name == "getPeople"));
    }

    #[test]
    fn double_binding_is_fatal() {
        let err = HttpServer::builder(people_registry(), local())
            .bind("getPerson", ok_handler())
            .bind("getPerson", ok_handler())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[test]
    fn route_collision_is_fatal() {
        let registry = Registry::builder()
            .endpoint(
                "byName",
                Endpoint::get("/people", schema::any())
                    .with_additional_paths(schema::tuple().item(schema::string())),
            )
            .endpoint(
                "byId",
                Endpoint::get("/people", schema::any())
                    .with_additional_paths(schema::tuple().item(schema::integer().coerce())),
            )
            .build()
            .unwrap();
        let err = HttpServer::builder(registry, local())
            .bind("byName", ok_handler())
            .bind("byId", ok_handler())
            .build()
            .unwrap_err();
        match err {
            ServerError::RouteCollision {
                method,
                route,
                first,
                second,
            } => {
                assert_eq!(method, Method::Get);
                assert_eq!(route, "/people/:0");
                assert_eq!(first, "byName");
                assert_eq!(second, "byId");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_route_different_methods_share_a_path() {
        let registry = Registry::builder()
            .endpoint("list", Endpoint::get("/people", schema::any()))
            .endpoint("create", Endpoint::post("/people", schema::any()))
            .build()
            .unwrap();
        let server = HttpServer::builder(registry, local())
            .bind("list", ok_handler())
            .bind("create", ok_handler())
            .build()
            .unwrap();
        assert_eq!(server.routes.len(), 1);
        assert_eq!(server.routes[0].1.len(), 2);
    }

    #[test]
    fn reserved_routes_collide() {
        let registry = Registry::builder()
            .endpoint("socketish", Endpoint::get("/socket", schema::any()))
            .build()
            .unwrap();
        let socket = SocketServer::builder(SocketDefinition::default()).build().unwrap();
        let err = HttpServer::builder(registry, local())
            .bind("socketish", ok_handler())
            .socket(socket)
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::RouteCollision { first, .. } if first == "socket"));
    }

    #[test]
    fn structured_channel_needs_converter() {
        let registry = Registry::builder()
            .endpoint(
                "since",
                Endpoint::get("/events", schema::any())
                    .with_headers(schema::object().field("x-window", schema::object())),
            )
            .build()
            .unwrap();

        let err = HttpServer::builder(registry.clone(), local())
            .bind("since", ok_handler())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::MissingConverter { channel: Channel::Headers, .. }
        ));

        let converters = Converters::new().with_headers(Converter::new(|headers| headers));
        assert!(
            HttpServer::builder(registry, local())
                .bind_with("since", Binding::new(ok_handler()).converters(converters))
                .build()
                .is_ok()
        );
    }

    #[test]
    fn docs_without_info_is_fatal() {
        let mut docs = DocsConfig::new(ApiInfo::new("People", "1.0.0"));
        docs.info = None;
        let err = HttpServer::builder(people_registry(), local().with_docs(docs))
            .bind("getPerson", ok_handler())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::Config { .. }));
    }

    #[test]
    fn openapi_follows_docs_config() {
        let server = HttpServer::builder(people_registry(), local())
            .bind("getPerson", ok_handler())
            .build()
            .unwrap();
        assert!(server.openapi().is_none());

        let config = local().with_docs(DocsConfig::new(ApiInfo::new("People", "1.0.0")));
        let server = HttpServer::builder(people_registry(), config)
            .bind("getPerson", ok_handler())
            .build()
            .unwrap();
        let doc = server.openapi().unwrap();
        assert!(doc["paths"].get("/people/{p0}/{p1}").is_some());
    }

    #[test]
    fn docs_page_escapes_title() {
        let page = docs_page(&ApiInfo::new("A <b> & \"c\"", "1"), "/docs.json");
        assert!(page.contains("<title>A &lt;b&gt; &amp; &quot;c&quot;</title>"));
        assert!(page.contains("url: \"/docs.json\""));
    }

    #[tokio::test]
    async fn lifecycle() {
        let mut server = HttpServer::builder(people_registry(), local())
            .bind("getPerson", ok_handler())
            .build()
            .unwrap();

        assert!(matches!(
            server.stop(StopMode::Graceful).await,
            Err(ServerError::NotRunning)
        ));

        let address = server.start().await.unwrap();
        assert_ne!(address.port(), 0);
        assert_eq!(server.local_addr(), Some(address));
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyRunning { .. })
        ));

        server.stop(StopMode::Graceful).await.unwrap();
        assert!(!server.is_running());

        server.start().await.unwrap();
        server.stop(StopMode::Force).await.unwrap();
        assert!(!server.is_running());
    }

    fn slow_server() -> HttpServer {
        let registry = Registry::builder()
            .endpoint("slow", Endpoint::get("/slow", schema::any()))
            .build()
            .unwrap();
        HttpServer::builder(registry, local())
            .bind("slow", |_request: HandlerRequest| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                HandlerResult::Ok(Success::ok(json!({ "done": true })))
            })
            .build()
            .unwrap()
    }

    /// Sends one HTTP/1.1 request and reads until the server closes.
    async fn raw_get(address: SocketAddr, path: &str) -> io::Result<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = TcpStream::connect(address).await?;
        let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    async fn stop_during_request(mode: StopMode) -> io::Result<String> {
        let mut server = slow_server();
        let address = server.start().await.unwrap();
        let request = tokio::spawn(raw_get(address, "/slow"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        server.stop(mode).await.unwrap();
        assert!(!server.is_running());
        request.await.unwrap()
    }

    #[tokio::test]
    async fn graceful_stop_finishes_requests_in_flight() {
        let response = stop_during_request(StopMode::Graceful).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#"{"done":true}"#));
    }

    #[tokio::test]
    async fn force_stop_cuts_requests_in_flight() {
        let started = std::time::Instant::now();
        let outcome = stop_during_request(StopMode::Force).await;
        assert!(started.elapsed() < Duration::from_millis(1000));
        match outcome {
            Ok(response) => assert!(!response.starts_with("HTTP/1.1 200"), "{response}"),
            Err(e) => assert!(matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            )),
        }
    }
}
