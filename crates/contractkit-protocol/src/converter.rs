//! Converters between wire shapes and schema inputs.
//!
//! Path segments, query parameters and headers arrive as strings. Most
//! schemas coerce from strings on their own; those that cannot (a date
//! built from two headers, a number without coercion, a nested object)
//! need a [`Converter`] for that channel. The wire shapes are:
//!
//! | channel | wire shape                                  |
//! |---------|---------------------------------------------|
//! | path    | array of decoded segment strings            |
//! | query   | object of key to array of value strings     |
//! | headers | object of lowercase name to string          |
//!
//! The server applies [`Converter::inbound`] before validation. The client
//! validates caller input first, then applies [`Converter::outbound`] to
//! get back to something it can stringify.

use std::fmt;
use std::sync::Arc;

use contractkit_core::{Kind, SchemaRef, WireForm};
use serde_json::Value;

use crate::endpoint::{Channel, Endpoint};

type ConvertFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A pair of pure functions for one channel.
#[derive(Clone)]
pub struct Converter {
    inbound: ConvertFn,
    outbound: Option<ConvertFn>,
}

impl Converter {
    /// Creates a converter from the wire shape to the schema input.
    pub fn new<F>(inbound: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            inbound: Arc::new(inbound),
            outbound: None,
        }
    }

    /// Builder: converter from the schema output back to a wire-ready
    /// value. Identity when not set.
    pub fn with_outbound<F>(mut self, outbound: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.outbound = Some(Arc::new(outbound));
        self
    }

    /// Wire shape to schema input.
    pub fn inbound(&self, wire: Value) -> Value {
        (self.inbound)(wire)
    }

    /// Schema output to wire-ready value.
    pub fn outbound(&self, value: Value) -> Value {
        match &self.outbound {
            Some(outbound) => outbound(value),
            None => value,
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("outbound", &self.outbound.is_some())
            .finish_non_exhaustive()
    }
}

/// Converters for the string-typed channels of one endpoint.
#[derive(Debug, Clone, Default)]
pub struct Converters {
    pub paths: Option<Converter>,
    pub query: Option<Converter>,
    pub headers: Option<Converter>,
}

impl Converters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: converter for trailing path segments.
    pub fn with_paths(mut self, converter: Converter) -> Self {
        self.paths = Some(converter);
        self
    }

    /// Builder: converter for the query map.
    pub fn with_query(mut self, converter: Converter) -> Self {
        self.query = Some(converter);
        self
    }

    /// Builder: converter for the header map.
    pub fn with_headers(mut self, converter: Converter) -> Self {
        self.headers = Some(converter);
        self
    }

    /// Returns the converter bound to `channel`.
    pub fn get(&self, channel: Channel) -> Option<&Converter> {
        match channel {
            Channel::Path => self.paths.as_ref(),
            Channel::Query => self.query.as_ref(),
            Channel::Headers => self.headers.as_ref(),
            Channel::Body | Channel::Response => None,
        }
    }

    /// Channels of `endpoint` that need a converter but have none here.
    pub fn missing_for(&self, endpoint: &Endpoint) -> Vec<Channel> {
        channels_needing_converter(endpoint)
            .into_iter()
            .filter(|channel| self.get(*channel).is_none())
            .collect()
    }
}

/// Channels of `endpoint` whose schema cannot be fed wire strings directly.
pub fn channels_needing_converter(endpoint: &Endpoint) -> Vec<Channel> {
    let mut channels = Vec::new();
    if let Some(schema) = endpoint.additional_paths()
        && !items_are(schema, |wire| wire == WireForm::Scalar)
    {
        channels.push(Channel::Path);
    }
    if let Some(schema) = endpoint.query()
        && !fields_are(schema, |wire| wire != WireForm::Structured)
    {
        channels.push(Channel::Query);
    }
    if let Some(schema) = endpoint.headers()
        && !fields_are(schema, |wire| wire == WireForm::Scalar)
    {
        channels.push(Channel::Headers);
    }
    channels
}

fn items_are(schema: &SchemaRef, accept: impl Fn(WireForm) -> bool) -> bool {
    let description = schema.describe();
    description.kind == Kind::Tuple
        && description
            .items
            .iter()
            .all(|item| accept(item.describe().wire))
}

fn fields_are(schema: &SchemaRef, accept: impl Fn(WireForm) -> bool) -> bool {
    let description = schema.describe();
    description.kind == Kind::Object
        && description
            .fields
            .iter()
            .all(|(_, field)| accept(field.describe().wire))
}
