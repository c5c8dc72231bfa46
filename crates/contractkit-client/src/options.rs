//! Client options and per-endpoint overrides.

use std::fmt;
use std::time::Duration;

use contractkit_core::{IntoSchema, SchemaRef};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ClientResult;

/// Options used to prepare and send a call.
#[derive(Clone)]
pub struct ClientOptions {
    /// Server root, including any server base path.
    pub base_url: Url,

    /// Header schema shared by every endpoint. Endpoint header fields win
    /// on collision.
    pub global_headers: Option<SchemaRef>,

    /// Header values sent unless the call supplies its own.
    pub default_headers: Map<String, Value>,

    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    /// Options for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Url`](crate::ClientError::Url) if `base_url`
    /// does not parse.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        Ok(Self::from_url(Url::parse(base_url)?))
    }

    pub fn from_url(base_url: Url) -> Self {
        Self {
            base_url,
            global_headers: None,
            default_headers: Map::new(),
            timeout: None,
        }
    }

    /// Builder: set the global header schema.
    pub fn with_global_headers(mut self, schema: impl IntoSchema) -> Self {
        self.global_headers = Some(schema.into_schema());
        self
    }

    /// Builder: add a default header value. Names are lowercased.
    pub fn with_default_header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.default_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Builder: set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns a copy with every key set in `over` replaced.
    pub fn apply(&self, over: &OptionsOverride) -> Self {
        let mut options = self.clone();
        if let Some(base_url) = &over.base_url {
            options.base_url = base_url.clone();
        }
        if let Some(schema) = &over.global_headers {
            options.global_headers = Some(schema.clone());
        }
        if let Some(headers) = &over.default_headers {
            options.default_headers = headers.clone();
        }
        if let Some(timeout) = over.timeout {
            options.timeout = Some(timeout);
        }
        options
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url.as_str())
            .field("global_headers", &self.global_headers.is_some())
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Shallow override of [`ClientOptions`] for some endpoints.
///
/// Only the keys that are set replace the base options; a set
/// `default_headers` replaces the whole map.
#[derive(Clone, Default)]
pub struct OptionsOverride {
    pub base_url: Option<Url>,
    pub global_headers: Option<SchemaRef>,
    pub default_headers: Option<Map<String, Value>>,
    pub timeout: Option<Duration>,
}

impl OptionsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: override the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Url`](crate::ClientError::Url) if `base_url`
    /// does not parse.
    pub fn with_base_url(mut self, base_url: &str) -> ClientResult<Self> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    pub fn with_global_headers(mut self, schema: impl IntoSchema) -> Self {
        self.global_headers = Some(schema.into_schema());
        self
    }

    pub fn with_default_headers(mut self, headers: Map<String, Value>) -> Self {
        self.default_headers = Some(
            headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
        );
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Layers `later` on top of `self`; keys set in `later` win.
    pub fn merge(&self, later: &OptionsOverride) -> Self {
        Self {
            base_url: later.base_url.clone().or_else(|| self.base_url.clone()),
            global_headers: later
                .global_headers
                .clone()
                .or_else(|| self.global_headers.clone()),
            default_headers: later
                .default_headers
                .clone()
                .or_else(|| self.default_headers.clone()),
            timeout: later.timeout.or(self.timeout),
        }
    }
}

impl fmt::Debug for OptionsOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsOverride")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("global_headers", &self.global_headers.is_some())
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}
