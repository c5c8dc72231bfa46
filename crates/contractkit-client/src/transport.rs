//! Pluggable transports.
//!
//! A [`Transport`] only moves a [`PreparedRequest`] to the server and the
//! answer back. Validation happens before (in [`prepare`](crate::prepare))
//! and after (in [`outcome`](crate::outcome)), so transports can be swapped
//! per call without changing either.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::Request;
use contractkit_protocol::Method;
use serde_json::Value;
use tower::ServiceExt;
use tracing::debug;

use crate::error::TransportError;
use crate::prepare::PreparedRequest;

/// What came back from the server, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Lowercase name/value pairs.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the first value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decodes the body as JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send + 'a>>;

/// Sends prepared requests.
pub trait Transport: Send + Sync {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        (**self).send(request)
    }
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct FetchTransport {
    client: reqwest::Client,
}

impl FetchTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing `reqwest` client (proxies, TLS roots, pools).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

impl Transport for FetchTransport {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(reqwest_method(request.method), request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e)
                }
            })?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response.bytes().await?.to_vec();
            Ok(RawResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Rewrites a request before it is sent.
pub type RequestInterceptor = Arc<dyn Fn(PreparedRequest) -> PreparedRequest + Send + Sync>;

/// Rewrites a response before it is interpreted.
pub type ResponseInterceptor = Arc<dyn Fn(RawResponse) -> RawResponse + Send + Sync>;

/// Runs interceptors around another transport.
///
/// Request interceptors run in registration order before the inner send;
/// response interceptors run in registration order after it.
#[derive(Clone)]
pub struct InterceptingTransport<T> {
    inner: T,
    on_request: Vec<RequestInterceptor>,
    on_response: Vec<ResponseInterceptor>,
}

impl<T: Transport> InterceptingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            on_request: Vec::new(),
            on_response: Vec::new(),
        }
    }

    /// Builder: add a request interceptor.
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(PreparedRequest) -> PreparedRequest + Send + Sync + 'static,
    {
        self.on_request.push(Arc::new(f));
        self
    }

    /// Builder: add a response interceptor.
    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(RawResponse) -> RawResponse + Send + Sync + 'static,
    {
        self.on_response.push(Arc::new(f));
        self
    }
}

impl<T: Transport> Transport for InterceptingTransport<T> {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let request = self
                .on_request
                .iter()
                .fold(request, |request, intercept| intercept(request));
            let response = self.inner.send(request).await?;
            Ok(self
                .on_response
                .iter()
                .fold(response, |response, intercept| intercept(response)))
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for InterceptingTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptingTransport")
            .field("inner", &self.inner)
            .field("on_request", &self.on_request.len())
            .field("on_response", &self.on_response.len())
            .finish()
    }
}

/// Sends requests in-process to an axum [`Router`].
///
/// Only the path and query of the prepared URL are used.
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    async fn call(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let mut builder = Request::builder()
            .method(request.method.as_str())
            .uri(request.path_and_query());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let body = request.body.map(Body::from).unwrap_or_else(Body::empty);
        let http_request = builder
            .body(body)
            .map_err(|e| TransportError::other(format!("invalid request: {}", e)))?;

        let response = self
            .router
            .clone()
            .oneshot(http_request)
            .await
            .map_err(|e| TransportError::other(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| TransportError::other(format!("failed to read body: {}", e)))?;
        debug!(status, "In-process request handled");
        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

impl Transport for RouterTransport {
    fn send(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            match request.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.call(request))
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => self.call(request).await,
            }
        })
    }
}

impl fmt::Debug for RouterTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterTransport").finish_non_exhaustive()
    }
}
