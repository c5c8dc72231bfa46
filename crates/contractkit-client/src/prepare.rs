//! Request preparation.
//!
//! Turns a call's typed input into a [`PreparedRequest`] without doing any
//! I/O. Every channel mirrors what the server parses:
//!
//! 1. trailing path values are validated, converted, stringified and
//!    percent-encoded, one segment each
//! 2. the query is validated and expanded, lists as repeated keys
//! 3. headers are validated against the endpoint schema merged over the
//!    global one, then stringified
//! 4. the body is validated and JSON-encoded

use std::time::Duration;

use contractkit_core::schema::merge_objects;
use contractkit_core::{SchemaError, SchemaRef};
use contractkit_protocol::{
    Channel, Converters, Endpoint, JSON_CONTENT_TYPE, Method, route, wire,
};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::options::ClientOptions;

/// Typed input of one call. Only declared channels are read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallInput {
    pub additional_paths: Option<Value>,
    pub body: Option<Value>,
    pub query: Option<Value>,
    pub headers: Option<Value>,
}

impl CallInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: trailing path values, usually an array.
    pub fn with_paths(mut self, paths: Value) -> Self {
        self.additional_paths = Some(paths);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_headers(mut self, headers: Value) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Builder: serialize a typed body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialization`] if `body` does not serialize.
    pub fn with_body_from<T: Serialize>(self, body: &T) -> ClientResult<Self> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }
}

/// A request ready for a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    /// Lowercase name/value pairs.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    /// Returns the first value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Path and query, as sent on the request line.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// Builds the request for `endpoint` from `input`.
///
/// # Errors
///
/// - [`ClientError::MissingConverter`] if a channel needs a converter that
///   `converters` lacks
/// - [`ClientError::InvalidInput`] if a channel fails its schema
/// - [`ClientError::InvalidPathSegment`] if a trailing value stringifies to
///   something that is not a single segment
pub fn prepare_request(
    name: &str,
    endpoint: &Endpoint,
    options: &ClientOptions,
    converters: &Converters,
    input: &CallInput,
) -> ClientResult<PreparedRequest> {
    if let Some(channel) = converters.missing_for(endpoint).into_iter().next() {
        return Err(ClientError::MissingConverter {
            endpoint: name.to_string(),
            channel,
        });
    }

    let mut url = endpoint_url(&options.base_url, endpoint.path());

    // 1. path
    if let Some(schema) = endpoint.additional_paths() {
        let value = parse(schema, input.additional_paths.as_ref(), Channel::Path)?;
        let value = outbound(converters, Channel::Path, value);
        let segments = path_segments(&value)?;
        let mut path = url.path().trim_end_matches('/').to_string();
        for segment in &segments {
            path.push('/');
            path.push_str(&route::encode_segment(segment));
        }
        url.set_path(&path);
    }

    // 2. query
    if let Some(schema) = endpoint.query() {
        let empty = Value::Object(Map::new());
        let value = parse(schema, Some(input.query.as_ref().unwrap_or(&empty)), Channel::Query)?;
        let value = outbound(converters, Channel::Query, value);
        wire::append_query(&mut url, &value);
    }

    // 3. headers
    let mut headers = prepare_headers(endpoint, options, converters, input)?;

    // 4. body
    let mut body = None;
    if let Some(schema) = endpoint.body() {
        let value = parse(schema, input.body.as_ref(), Channel::Body)?;
        body = Some(serde_json::to_vec(&value)?);
        headers.retain(|(name, _)| name != "content-type");
        headers.push(("content-type".to_string(), JSON_CONTENT_TYPE.to_string()));
    }

    Ok(PreparedRequest {
        method: endpoint.method(),
        url,
        headers,
        body,
        timeout: options.timeout,
    })
}

/// `base_url` joined with the endpoint path, keeping the base path.
fn endpoint_url(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let joined = format!(
        "{}/{}",
        base_url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(joined.trim_end_matches('/'));
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn parse(schema: &SchemaRef, value: Option<&Value>, channel: Channel) -> ClientResult<Value> {
    schema
        .parse(value.unwrap_or(&Value::Null))
        .map_err(|error| ClientError::invalid_input(channel, error))
}

fn outbound(converters: &Converters, channel: Channel, value: Value) -> Value {
    match converters.get(channel) {
        Some(converter) => converter.outbound(value),
        None => value,
    }
}

fn path_segments(value: &Value) -> ClientResult<Vec<String>> {
    let values = match value {
        Value::Array(values) => values.as_slice(),
        other => std::slice::from_ref(other),
    };
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let segment = wire::to_wire_string(value).unwrap_or_default();
            if segment.is_empty() || segment.contains('/') {
                return Err(ClientError::InvalidPathSegment { index, segment });
            }
            Ok(segment)
        })
        .collect()
}

fn prepare_headers(
    endpoint: &Endpoint,
    options: &ClientOptions,
    converters: &Converters,
    input: &CallInput,
) -> ClientResult<Vec<(String, String)>> {
    let mut values = options.default_headers.clone();
    if let Some(Value::Object(supplied)) = &input.headers {
        for (name, value) in supplied {
            values.insert(name.to_ascii_lowercase(), value.clone());
        }
    }
    let values = Value::Object(values);

    let schema = match (options.global_headers.as_ref(), endpoint.headers()) {
        (Some(global), Some(own)) => Some(merge_objects(global, own).unwrap_or_else(|| own.clone())),
        (Some(global), None) => Some(global.clone()),
        (None, own) => own.cloned(),
    };
    let Some(schema) = schema else {
        return Ok(wire::header_pairs(&values));
    };

    let parsed = schema
        .parse(&values)
        .map_err(|error: SchemaError| ClientError::invalid_input(Channel::Headers, error))?;
    let parsed = if endpoint.headers().is_some() {
        outbound(converters, Channel::Headers, parsed)
    } else {
        parsed
    };
    Ok(wire::header_pairs(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractkit_core::schema;
    use contractkit_protocol::Converter;
    use serde_json::json;

    fn people() -> Endpoint {
        Endpoint::get("/people", schema::object().field("success", schema::boolean()))
            .with_additional_paths(
                schema::tuple()
                    .item(schema::enumeration(["Bob", "Douglas", "Jeremy"]))
                    .item(schema::enumeration(["Smith", "Jones", "Williams"])),
            )
    }

    fn options() -> ClientOptions {
        ClientOptions::new("http://localhost:3000/api").unwrap()
    }

    #[test]
    fn trailing_paths_are_appended() {
        let input = CallInput::new().with_paths(json!(["Bob", "Williams"]));
        let request =
            prepare_request("getPerson", &people(), &options(), &Converters::new(), &input).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url.as_str(), "http://localhost:3000/api/people/Bob/Williams");
        assert!(request.body.is_none());
        assert!(request.headers.is_empty());
    }

    #[test]
    fn invalid_path_values_are_caller_errors() {
        let input = CallInput::new().with_paths(json!(["Alice", "Williams"]));
        let err = prepare_request("getPerson", &people(), &options(), &Converters::new(), &input)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidInput { channel: Channel::Path, .. }
        ));

        let err = prepare_request("getPerson", &people(), &options(), &Converters::new(), &CallInput::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput { .. }));
    }

    #[test]
    fn segments_are_encoded_and_slashes_rejected() {
        let endpoint = Endpoint::get("/files", schema::any())
            .with_additional_paths(schema::tuple().item(schema::string()).item(schema::integer()));

        let input = CallInput::new().with_paths(json!(["read me.txt", 3]));
        let request =
            prepare_request("file", &endpoint, &options(), &Converters::new(), &input).unwrap();
        assert_eq!(request.url.path(), "/api/files/read%20me.txt/3");

        let input = CallInput::new().with_paths(json!(["a/b", 3]));
        let err = prepare_request("file", &endpoint, &options(), &Converters::new(), &input)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidPathSegment { index: 0, ref segment } if segment == "a/b"
        ));
    }

    #[test]
    fn path_outbound_converter() {
        let endpoint = Endpoint::get("/days", schema::any())
            .with_additional_paths(schema::tuple().item(schema::datetime()));
        let converters = Converters::new().with_paths(
            Converter::new(|wire| wire).with_outbound(|value| {
                let day = value[0].as_str().unwrap_or_default();
                Value::Array(vec![Value::String(day[..10].to_string())])
            }),
        );
        let input = CallInput::new().with_paths(json!(["2024-03-01T12:00:00+02:00"]));
        let request = prepare_request("day", &endpoint, &options(), &converters, &input).unwrap();
        assert_eq!(request.url.path(), "/api/days/2024-03-01");
    }

    #[test]
    fn query_lists_repeat_keys() {
        let endpoint = Endpoint::get("/search", schema::any()).with_query(
            schema::object()
                .field("tag", schema::array(schema::string()))
                .field("limit", schema::optional(schema::integer())),
        );
        let input = CallInput::new().with_query(json!({ "tag": ["a", "b c"], "limit": 10 }));
        let request =
            prepare_request("search", &endpoint, &options(), &Converters::new(), &input).unwrap();
        assert_eq!(request.path_and_query(), "/api/search?limit=10&tag=a&tag=b+c");

        let input = CallInput::new().with_query(json!({ "tag": [] }));
        let request =
            prepare_request("search", &endpoint, &options(), &Converters::new(), &input).unwrap();
        assert_eq!(request.url.query(), None);

        let input = CallInput::new().with_query(json!({ "tag": "a" }));
        let err = prepare_request("search", &endpoint, &options(), &Converters::new(), &input)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidInput { channel: Channel::Query, .. }
        ));
    }

    #[test]
    fn endpoint_headers_win_over_global_headers() {
        let endpoint = Endpoint::get("/secret", schema::any())
            .with_headers(schema::object().field("authorization", schema::literal("1234567890")));
        let options = options()
            .with_global_headers(
                schema::object()
                    .field("authorization", schema::string())
                    .field("x-trace", schema::optional(schema::string())),
            )
            .with_default_header("x-trace", "abc");

        let input = CallInput::new().with_headers(json!({ "Authorization": "1234567890" }));
        let request =
            prepare_request("secret", &endpoint, &options, &Converters::new(), &input).unwrap();
        assert_eq!(request.header("authorization"), Some("1234567890"));
        assert_eq!(request.header("x-trace"), Some("abc"));

        // The endpoint literal replaces the global string.
        let input = CallInput::new().with_headers(json!({ "authorization": "other" }));
        let err = prepare_request("secret", &endpoint, &options, &Converters::new(), &input)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidInput { channel: Channel::Headers, .. }
        ));
    }

    #[test]
    fn global_headers_apply_without_endpoint_headers() {
        let endpoint = Endpoint::get("/open", schema::any());
        let options = options()
            .with_global_headers(schema::object().field("authorization", schema::string()));

        let err = prepare_request("open", &endpoint, &options, &Converters::new(), &CallInput::new())
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput { .. }));

        let options = options.with_default_header("authorization", "token");
        let request =
            prepare_request("open", &endpoint, &options, &Converters::new(), &CallInput::new())
                .unwrap();
        assert_eq!(request.headers, vec![("authorization".into(), "token".into())]);
    }

    #[test]
    fn body_is_validated_and_typed() {
        let endpoint = Endpoint::post("/people", schema::any()).with_body(
            schema::object()
                .field("name", schema::string())
                .field("age", schema::integer()),
        );
        let input = CallInput::new().with_body(json!({ "name": "Bob", "age": 42, "extra": 1 }));
        let request =
            prepare_request("create", &endpoint, &options(), &Converters::new(), &input).unwrap();
        assert_eq!(request.header("content-type"), Some("application/json"));
        let sent: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({ "name": "Bob", "age": 42 }));

        let err = prepare_request("create", &endpoint, &options(), &Converters::new(), &CallInput::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidInput { channel: Channel::Body, .. }
        ));
    }

    #[test]
    fn structured_channels_need_a_converter() {
        let endpoint = Endpoint::get("/window", schema::any()).with_headers(
            schema::object().field("window", schema::object().field("from", schema::datetime())),
        );
        let err = prepare_request("window", &endpoint, &options(), &Converters::new(), &CallInput::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingConverter { channel: Channel::Headers, .. }
        ));
    }

    #[test]
    fn base_url_path_is_kept() {
        let endpoint = Endpoint::delete("/people/", schema::any());
        let options = ClientOptions::new("http://localhost:3000/v1/").unwrap();
        let request =
            prepare_request("remove", &endpoint, &options, &Converters::new(), &CallInput::new())
                .unwrap();
        assert_eq!(request.method, Method::Delete);
        assert_eq!(request.url.as_str(), "http://localhost:3000/v1/people");
    }
}
