//! Endpoint definitions.
//!
//! An [`Endpoint`] is the full contract of one HTTP operation: its method,
//! its root-relative path, the schema of its success payload and the
//! optional schemas of each request channel.

use std::fmt;
use std::str::FromStr;

use contractkit_core::{IntoSchema, Kind, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::route;

/// HTTP methods an endpoint can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    /// Every supported method, in declaration order.
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
    ];

    /// Returns the uppercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownMethod(s.to_string()))
    }
}

/// An independently validated part of a request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Trailing path segments after the endpoint path.
    Path,
    Query,
    Headers,
    Body,
    Response,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Headers => "headers",
            Self::Body => "body",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract of one HTTP operation.
///
/// Endpoints are immutable once registered; the `with_*` builders consume
/// and return the value.
#[derive(Debug, Clone)]
pub struct Endpoint {
    method: Method,
    path: String,
    response: SchemaRef,
    body: Option<SchemaRef>,
    query: Option<SchemaRef>,
    headers: Option<SchemaRef>,
    additional_paths: Option<SchemaRef>,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

impl Endpoint {
    /// Creates an endpoint with no request channels.
    pub fn new(method: Method, path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self {
            method,
            path: path.into(),
            response: response.into_schema(),
            body: None,
            query: None,
            headers: None,
            additional_paths: None,
            summary: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Creates a GET endpoint.
    pub fn get(path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self::new(Method::Get, path, response)
    }

    /// Creates a POST endpoint.
    pub fn post(path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self::new(Method::Post, path, response)
    }

    /// Creates a PUT endpoint.
    pub fn put(path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self::new(Method::Put, path, response)
    }

    /// Creates a DELETE endpoint.
    pub fn delete(path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self::new(Method::Delete, path, response)
    }

    /// Creates a PATCH endpoint.
    pub fn patch(path: impl Into<String>, response: impl IntoSchema) -> Self {
        Self::new(Method::Patch, path, response)
    }

    /// Builder: declare a JSON request body.
    pub fn with_body(mut self, schema: impl IntoSchema) -> Self {
        self.body = Some(schema.into_schema());
        self
    }

    /// Builder: declare a query schema. Its input is a map from key to the
    /// ordered list of values received for that key.
    pub fn with_query(mut self, schema: impl IntoSchema) -> Self {
        self.query = Some(schema.into_schema());
        self
    }

    /// Builder: declare a header schema. Keys should be lowercase.
    pub fn with_headers(mut self, schema: impl IntoSchema) -> Self {
        self.headers = Some(schema.into_schema());
        self
    }

    /// Builder: declare trailing path segments as a tuple schema.
    pub fn with_additional_paths(mut self, schema: impl IntoSchema) -> Self {
        self.additional_paths = Some(schema.into_schema());
        self
    }

    /// Builder: one-line summary shown in the API docs.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder: long description shown in the API docs.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: add a docs tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn response(&self) -> &SchemaRef {
        &self.response
    }

    pub fn body(&self) -> Option<&SchemaRef> {
        self.body.as_ref()
    }

    pub fn query(&self) -> Option<&SchemaRef> {
        self.query.as_ref()
    }

    pub fn headers(&self) -> Option<&SchemaRef> {
        self.headers.as_ref()
    }

    pub fn additional_paths(&self) -> Option<&SchemaRef> {
        self.additional_paths.as_ref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the schema declared for `channel`, if any.
    pub fn schema(&self, channel: Channel) -> Option<&SchemaRef> {
        match channel {
            Channel::Path => self.additional_paths(),
            Channel::Query => self.query(),
            Channel::Headers => self.headers(),
            Channel::Body => self.body(),
            Channel::Response => Some(&self.response),
        }
    }

    /// Schemas of the trailing path segments, in order.
    pub fn path_items(&self) -> Vec<SchemaRef> {
        self.additional_paths
            .as_ref()
            .map(|schema| schema.describe().items)
            .unwrap_or_default()
    }

    /// Number of trailing path segments.
    pub fn path_arity(&self) -> usize {
        self.path_items().len()
    }

    /// Returns true if the trailing path schema is a tuple (or absent).
    pub(crate) fn has_tuple_paths(&self) -> bool {
        self.additional_paths
            .as_ref()
            .is_none_or(|schema| schema.describe().kind == Kind::Tuple)
    }

    /// Derives the route served under `base_path`, with one positional
    /// placeholder per trailing segment.
    pub fn route(&self, base_path: &str) -> String {
        route::derive_route(base_path, &self.path, self.path_arity())
    }
}
