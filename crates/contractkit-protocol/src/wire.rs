//! Wire encodings shared by the server and the client.
//!
//! Both sides must agree exactly on how typed values become strings and
//! back. The server parses with [`query_map`], [`shape_query`] and
//! [`header_object`]; the client writes with [`append_query`] and
//! [`header_pairs`]. Every value is stringified by [`to_wire_string`].

use std::fmt;

use contractkit_core::{Description, Kind, SchemaError, WireForm};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Error kinds carried in the `error` field of failure bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidPath,
    InvalidBody,
    InvalidQuery,
    InvalidHeaders,
    InvalidMiddlewareHeaders,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPath => "InvalidPath",
            Self::InvalidBody => "InvalidBody",
            Self::InvalidQuery => "InvalidQuery",
            Self::InvalidHeaders => "InvalidHeaders",
            Self::InvalidMiddlewareHeaders => "InvalidMiddlewareHeaders",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body of every non-2xx response.
///
/// Serializes as `{"error": ..., "zodError"?: ..., ...details}`. The
/// `zodError` name is what existing clients of this protocol read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,

    /// Validation diagnostic; omitted when obfuscated.
    #[serde(rename = "zodError", default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Value>,

    /// Extra fields supplied by a handler failure.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            diagnostic: None,
            details: Map::new(),
        }
    }

    /// Body for a validation failure; the diagnostic is dropped when
    /// `obfuscate` is set.
    pub fn validation(kind: ErrorKind, error: &SchemaError, obfuscate: bool) -> Self {
        Self {
            error: kind.to_string(),
            diagnostic: (!obfuscate).then(|| error.to_value()),
            details: Map::new(),
        }
    }

    /// Generic body for a panic or an invalid handler result.
    pub fn internal() -> Self {
        Self::new(ErrorKind::InternalError.as_str())
    }

    /// Builder: merge handler-supplied details. Non-object details are
    /// stored under `details`.
    pub fn with_details(mut self, details: Value) -> Self {
        match details {
            Value::Object(map) => {
                for (key, value) in map {
                    if key != "error" {
                        self.details.insert(key, value);
                    }
                }
            }
            Value::Null => {}
            other => {
                self.details.insert("details".to_string(), other);
            }
        }
        self
    }

    /// Returns the error kind if the `error` field names one.
    pub fn kind(&self) -> Option<ErrorKind> {
        serde_json::from_value(Value::String(self.error.clone())).ok()
    }
}

/// Stringifies a value for a path segment, query value or header.
///
/// Strings pass through unquoted, numbers and booleans use their JSON
/// spelling, `null` yields nothing and composites are JSON-encoded.
pub fn to_wire_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Collects a raw query string into key to ordered list of values.
pub fn query_map(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let entry = map
            .entry(key.into_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.into_owned()));
        }
    }
    map
}

/// Default query normalization when no converter is bound: keys whose
/// field is repeated keep every value, all others keep the first.
///
/// An empty list puts nothing on the wire, so a required repeated field
/// missing from `raw` reads as `[]`.
pub fn shape_query(raw: Map<String, Value>, description: &Description) -> Value {
    let mut shaped: Map<String, Value> = raw
        .into_iter()
        .map(|(key, values)| {
            let repeated = description
                .field(&key)
                .is_some_and(|field| is_repeated(&field.describe()));
            let value = match values {
                Value::Array(values) if !repeated => {
                    values.into_iter().next().unwrap_or(Value::Null)
                }
                other => other,
            };
            (key, value)
        })
        .collect();

    for (key, field) in &description.fields {
        let field = field.describe();
        if is_repeated(&field) && !field.optional && !shaped.contains_key(key) {
            shaped.insert(key.clone(), Value::Array(Vec::new()));
        }
    }
    Value::Object(shaped)
}

fn is_repeated(field: &Description) -> bool {
    field.kind == Kind::Array || field.wire == WireForm::Repeated
}

/// Appends the validated query object to `url`.
///
/// Lists append one parameter per element under the same key; `null`
/// values and elements are skipped.
pub fn append_query(url: &mut Url, query: &Value) {
    let Value::Object(map) = query else {
        return;
    };
    let pairs: Vec<(&str, String)> = map
        .iter()
        .flat_map(|(key, value)| match value {
            Value::Array(values) => values
                .iter()
                .filter_map(|v| to_wire_string(v).map(|s| (key.as_str(), s)))
                .collect::<Vec<_>>(),
            other => to_wire_string(other)
                .map(|s| vec![(key.as_str(), s)])
                .unwrap_or_default(),
        })
        .collect();
    if pairs.is_empty() {
        return;
    }
    url.query_pairs_mut().extend_pairs(pairs);
}

/// Builds the header object from raw name/value pairs: names are
/// lowercased and repeated headers are joined with `", "`.
pub fn header_object<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut map = Map::new();
    for (name, value) in pairs {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.as_ref();
        match map.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(name, Value::String(value.to_string()));
            }
        }
    }
    Value::Object(map)
}

/// Flattens the validated header object into outbound name/value pairs.
pub fn header_pairs(headers: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = headers else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Array(values) => {
                    let parts: Vec<String> = values.iter().filter_map(to_wire_string).collect();
                    Some(parts.join(", "))
                }
                other => to_wire_string(other),
            }?;
            Some((name.to_ascii_lowercase(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractkit_core::{Schema, schema};
    use serde_json::json;

    #[test]
    fn error_body_shape() {
        let err = SchemaError::root(contractkit_core::IssueCode::InvalidType, "Required");
        let body = ErrorBody::validation(ErrorKind::InvalidBody, &err, false);
        insta::assert_json_snapshot!(body, @r#"
        {
          "error": "InvalidBody",
          "zodError": {
            "issues": [
              {
                "code": "invalid_type",
                "path": [],
                "message": "Required"
              }
            ]
          }
        }
        "#);
    }

    #[test]
    fn obfuscated_body_has_no_diagnostic() {
        let err = SchemaError::root(contractkit_core::IssueCode::InvalidType, "Required");
        let body = ErrorBody::validation(ErrorKind::InvalidQuery, &err, true);
        let text = serde_json::to_string(&body).unwrap();
        assert_eq!(text, r#"{"error":"InvalidQuery"}"#);
        assert_eq!(body.kind(), Some(ErrorKind::InvalidQuery));
    }

    #[test]
    fn handler_details_are_flattened() {
        let body = ErrorBody::new("NotFound").with_details(json!({ "id": 7, "error": "ignored" }));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "error": "NotFound", "id": 7 })
        );
        let body = ErrorBody::new("Teapot").with_details(json!("short and stout"));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "error": "Teapot", "details": "short and stout" })
        );
        assert_eq!(body.kind(), None);
    }

    #[test]
    fn wire_strings() {
        assert_eq!(to_wire_string(&json!("Bob")), Some("Bob".to_string()));
        assert_eq!(to_wire_string(&json!(42)), Some("42".to_string()));
        assert_eq!(to_wire_string(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(to_wire_string(&json!(true)), Some("true".to_string()));
        assert_eq!(to_wire_string(&json!(null)), None);
        assert_eq!(to_wire_string(&json!({"a": 1})), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn query_map_keeps_repeats_in_order() {
        let map = query_map("tag=a&limit=10&tag=b&tag=c%20d");
        assert_eq!(map["tag"], json!(["a", "b", "c d"]));
        assert_eq!(map["limit"], json!(["10"]));
    }

    #[test]
    fn shape_query_follows_field_kinds() {
        let schema = schema::object()
            .field("tag", schema::array(schema::string()))
            .field("limit", schema::integer().coerce());
        let shaped = shape_query(query_map("tag=a&tag=b&limit=10&limit=20&extra=x"), &schema.describe());
        assert_eq!(shaped, json!({ "tag": ["a", "b"], "limit": "10", "extra": "x" }));
        assert_eq!(
            schema.parse(&shaped).unwrap(),
            json!({ "tag": ["a", "b"], "limit": 10 })
        );
    }

    #[test]
    fn append_query_repeats_list_values() {
        let mut url = Url::parse("http://localhost/items").unwrap();
        append_query(&mut url, &json!({ "tag": ["a", "b"], "limit": 10, "skip": null }));
        assert_eq!(url.as_str(), "http://localhost/items?limit=10&tag=a&tag=b");

        let mut url = Url::parse("http://localhost/items").unwrap();
        append_query(&mut url, &json!({ "skip": null }));
        assert_eq!(url.query(), None);
    }

    #[test]
    fn query_round_trip() {
        let values: Vec<String> = (0..5).map(|i| format!("v {}&{}", i, i)).collect();
        let mut url = Url::parse("http://localhost/").unwrap();
        append_query(&mut url, &json!({ "tag": values }));

        let schema = schema::object().field("tag", schema::array(schema::string()));
        let shaped = shape_query(query_map(url.query().unwrap()), &schema.describe());
        assert_eq!(shaped["tag"], json!(values));
    }

    #[test]
    fn empty_list_reads_back_empty() {
        let mut url = Url::parse("http://localhost/").unwrap();
        append_query(&mut url, &json!({ "tag": [], "note": [] }));
        assert_eq!(url.query(), None);

        let schema = schema::object()
            .field("tag", schema::array(schema::string()))
            .field("note", schema::optional(schema::array(schema::string())))
            .field("page", schema::integer().coerce());
        let shaped = shape_query(query_map(""), &schema.describe());
        assert_eq!(shaped, json!({ "tag": [] }));
        assert!(schema.parse(&shaped).is_err());

        let shaped = shape_query(query_map("page=2"), &schema.describe());
        assert_eq!(shaped, json!({ "tag": [], "page": "2" }));
        assert_eq!(
            schema.parse(&shaped).unwrap(),
            json!({ "tag": [], "page": 2 })
        );
    }

    #[test]
    fn headers_are_lowercased_and_joined() {
        let headers = header_object([
            ("Authorization", "token"),
            ("Accept", "text/html"),
            ("accept", "application/json"),
        ]);
        assert_eq!(
            headers,
            json!({ "authorization": "token", "accept": "text/html, application/json" })
        );
    }

    #[test]
    fn header_pairs_stringify() {
        let pairs = header_pairs(&json!({
            "X-Count": 3,
            "x-flags": ["a", "b"],
            "x-missing": null,
        }));
        assert_eq!(
            pairs,
            [
                ("x-count".to_string(), "3".to_string()),
                ("x-flags".to_string(), "a, b".to_string()),
            ]
        );
    }
}
