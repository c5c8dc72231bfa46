//! Per-request dispatch.
//!
//! Every inbound request for an endpoint goes through the same stages, in
//! order, stopping at the first failure:
//!
//! 0. middleware headers (server-wide schema, then middleware functions)
//! 1. trailing path segments
//! 2. JSON body
//! 3. query
//! 4. headers
//! 5. handler
//! 6. response serialization
//!
//! A panic anywhere in stages 0 to 5 is answered with a bare 500
//! `InternalError`; the panic message is only logged.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use contractkit_core::{IssueCode, SchemaError, SchemaRef};
use contractkit_protocol::{Channel, Converters, Endpoint, ErrorBody, ErrorKind, Method, route, wire};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

/// Parsed request handed to a handler.
///
/// A channel is `Some` exactly when the endpoint declares it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerRequest {
    pub additional_paths: Option<Value>,
    pub body: Option<Value>,
    pub query: Option<Value>,
    pub headers: Option<Value>,
}

impl HandlerRequest {
    /// Deserializes the body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.body)
    }

    /// Deserializes the query into `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.query)
    }

    /// Deserializes the headers into `T`.
    pub fn headers_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.headers)
    }

    /// Deserializes the trailing path segments into `T` (usually a tuple).
    pub fn paths_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        decode(&self.additional_paths)
    }

    /// Returns one parsed trailing segment.
    pub fn path(&self, index: usize) -> Option<&Value> {
        self.additional_paths.as_ref()?.get(index)
    }
}

fn decode<T: DeserializeOwned>(channel: &Option<Value>) -> serde_json::Result<T> {
    T::deserialize(channel.as_ref().unwrap_or(&Value::Null))
}

/// Successful handler result. `status` must be 2xx.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    pub status: u16,
    pub data: Value,
}

impl Success {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    /// 200 with `data`.
    pub fn ok(data: Value) -> Self {
        Self::new(200, data)
    }
}

/// Failed handler result. `status` must be 4xx or 5xx.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub status: u16,
    pub error: String,
    pub details: Option<Value>,
}

impl Failure {
    pub fn new(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(400, error)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(401, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(404, error)
    }

    /// Builder: extra fields merged into the error body.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result returned by handlers.
pub type HandlerResult = Result<Success, Failure>;

/// Boxed future returned by handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Type-erased endpoint handler.
pub type Handler = Arc<dyn Fn(HandlerRequest) -> HandlerFuture + Send + Sync>;

/// Wraps an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// What middleware sees of a request.
#[derive(Debug, Clone)]
pub struct MiddlewareRequest {
    /// Name of the matched endpoint.
    pub endpoint: String,
    pub method: Method,
    pub path: String,
    /// Output of the middleware header schema, when configured.
    pub headers: Option<Value>,
}

/// Boxed future returned by middleware.
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = Result<(), Failure>> + Send>>;

/// Type-erased middleware. Returning a [`Failure`] rejects the request
/// before any endpoint channel is parsed.
pub type Middleware = Arc<dyn Fn(MiddlewareRequest) -> MiddlewareFuture + Send + Sync>;

/// Wraps an async function as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(MiddlewareRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Failure>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// A handler plus its per-endpoint options.
#[derive(Clone)]
pub struct Binding {
    pub(crate) handler: Handler,
    pub(crate) converters: Converters,
    pub(crate) obfuscate: Option<bool>,
}

impl Binding {
    /// Binds an async function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_handler(handler_fn(f))
    }

    /// Binds an already erased handler.
    pub fn from_handler(handler: Handler) -> Self {
        Self {
            handler,
            converters: Converters::default(),
            obfuscate: None,
        }
    }

    /// Builder: converters for the string channels.
    pub fn converters(mut self, converters: Converters) -> Self {
        self.converters = converters;
        self
    }

    /// Builder: override the server obfuscation flag for this endpoint.
    pub fn obfuscate(mut self, obfuscate: bool) -> Self {
        self.obfuscate = Some(obfuscate);
        self
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("converters", &self.converters)
            .field("obfuscate", &self.obfuscate)
            .finish_non_exhaustive()
    }
}

/// Early exit of a dispatch stage.
enum Rejection {
    Invalid(ErrorKind, SchemaError),
    Failed(Failure),
}

/// Dispatch state of one bound endpoint.
pub(crate) struct Dispatcher {
    pub(crate) name: String,
    pub(crate) endpoint: Endpoint,
    pub(crate) route: String,
    prefix: String,
    handler: Handler,
    converters: Converters,
    obfuscate: bool,
    body_limit: usize,
    middleware_headers: Option<SchemaRef>,
    middleware: Arc<[Middleware]>,
}

/// Server-wide settings shared by every dispatcher.
pub(crate) struct DispatchSettings {
    pub(crate) base_path: String,
    pub(crate) obfuscate: bool,
    pub(crate) body_limit: usize,
    pub(crate) middleware_headers: Option<SchemaRef>,
    pub(crate) middleware: Arc<[Middleware]>,
}

impl Dispatcher {
    pub(crate) fn new(
        name: &str,
        endpoint: &Endpoint,
        binding: Binding,
        settings: &DispatchSettings,
    ) -> Self {
        Self {
            name: name.to_string(),
            route: endpoint.route(&settings.base_path),
            prefix: route::derive_route(&settings.base_path, endpoint.path(), 0),
            endpoint: endpoint.clone(),
            handler: binding.handler,
            converters: binding.converters,
            obfuscate: binding.obfuscate.unwrap_or(settings.obfuscate),
            body_limit: settings.body_limit,
            middleware_headers: settings.middleware_headers.clone(),
            middleware: settings.middleware.clone(),
        }
    }

    /// Runs every stage for one request and renders the response.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(endpoint = %self.name, method = %self.endpoint.method(), route = %self.route)
    )]
    pub(crate) async fn dispatch(self: Arc<Self>, request: Request<Body>) -> Response {
        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.run(request)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(success)) => self.success(success),
            Ok(Err(rejection)) => self.reject(rejection),
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Request handling panicked");
                internal_error()
            }
        };
        debug!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }

    async fn run(&self, request: Request<Body>) -> Result<Success, Rejection> {
        let (parts, body) = request.into_parts();
        let headers = wire::header_object(
            parts
                .headers
                .iter()
                .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()))),
        );

        // 0. middleware
        let mut middleware_headers = None;
        if let Some(schema) = &self.middleware_headers {
            middleware_headers = Some(validate(
                schema,
                &headers,
                ErrorKind::InvalidMiddlewareHeaders,
            )?);
        }
        if !self.middleware.is_empty() {
            let request = MiddlewareRequest {
                endpoint: self.name.clone(),
                method: self.endpoint.method(),
                path: parts.uri.path().to_string(),
                headers: middleware_headers,
            };
            for middleware in self.middleware.iter() {
                middleware(request.clone()).await.map_err(Rejection::Failed)?;
            }
        }

        let mut input = HandlerRequest::default();

        // 1. path
        if let Some(schema) = self.endpoint.additional_paths() {
            let segments = route::trailing_segments(parts.uri.path(), &self.prefix)
                .ok_or_else(|| {
                    invalid(ErrorKind::InvalidPath, IssueCode::InvalidString, "Malformed path segment")
                })?;
            let wire = Value::Array(segments.into_iter().map(Value::String).collect());
            let value = self.convert(Channel::Path, wire);
            input.additional_paths = Some(validate(schema, &value, ErrorKind::InvalidPath)?);
        }

        // 2. body
        if let Some(schema) = self.endpoint.body() {
            let bytes = to_bytes(body, self.body_limit).await.map_err(|e| {
                invalid(ErrorKind::InvalidBody, IssueCode::Custom, format!("Failed to read body: {}", e))
            })?;
            let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
                invalid(ErrorKind::InvalidBody, IssueCode::InvalidType, format!("Invalid JSON: {}", e))
            })?;
            input.body = Some(validate(schema, &value, ErrorKind::InvalidBody)?);
        }

        // 3. query
        if let Some(schema) = self.endpoint.query() {
            let raw = wire::query_map(parts.uri.query().unwrap_or_default());
            let value = match self.converters.get(Channel::Query) {
                Some(converter) => converter.inbound(Value::Object(raw)),
                None => wire::shape_query(raw, &schema.describe()),
            };
            input.query = Some(validate(schema, &value, ErrorKind::InvalidQuery)?);
        }

        // 4. headers
        if let Some(schema) = self.endpoint.headers() {
            let value = self.convert(Channel::Headers, headers);
            input.headers = Some(validate(schema, &value, ErrorKind::InvalidHeaders)?);
        }

        // 5. handler
        (self.handler)(input).await.map_err(Rejection::Failed)
    }

    fn convert(&self, channel: Channel, wire: Value) -> Value {
        match self.converters.get(channel) {
            Some(converter) => converter.inbound(wire),
            None => wire,
        }
    }

    fn success(&self, success: Success) -> Response {
        match StatusCode::from_u16(success.status) {
            Ok(status) if status.is_success() => (status, Json(success.data)).into_response(),
            _ => {
                error!(status = success.status, "Handler returned a success status outside 2xx");
                internal_error()
            }
        }
    }

    fn reject(&self, rejection: Rejection) -> Response {
        match rejection {
            Rejection::Invalid(kind, error) => {
                debug!(kind = %kind, error = %error, "Request rejected");
                let body = ErrorBody::validation(kind, &error, self.obfuscate);
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Rejection::Failed(failure) => match StatusCode::from_u16(failure.status) {
                Ok(status) if status.is_client_error() || status.is_server_error() => {
                    let mut body = ErrorBody::new(failure.error);
                    if let Some(details) = failure.details {
                        body = body.with_details(details);
                    }
                    (status, Json(body)).into_response()
                }
                _ => {
                    error!(status = failure.status, "Handler returned a failure status outside 4xx/5xx");
                    internal_error()
                }
            },
        }
    }
}

fn validate(schema: &SchemaRef, value: &Value, kind: ErrorKind) -> Result<Value, Rejection> {
    schema
        .parse(value)
        .map_err(|error| Rejection::Invalid(kind, error))
}

fn invalid(kind: ErrorKind, code: IssueCode, message: impl Into<String>) -> Rejection {
    Rejection::Invalid(kind, SchemaError::root(code, message))
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::internal())).into_response()
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
