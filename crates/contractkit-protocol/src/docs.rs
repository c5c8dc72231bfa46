//! OpenAPI generation.
//!
//! The document is derived from the registry alone: every endpoint becomes
//! one operation whose parameters, request body and responses come from the
//! declared schemas via [`Schema::describe`](contractkit_core::Schema::describe).

use contractkit_core::{Kind, SchemaRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::JSON_CONTENT_TYPE;
use crate::endpoint::Endpoint;
use crate::registry::Registry;
use crate::route;

/// OpenAPI version emitted by [`openapi_document`].
pub const OPENAPI_VERSION: &str = "3.0.3";

/// The `info` object of the generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ApiInfo {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            description: None,
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Renders a schema as an OpenAPI 3.0 schema object.
pub fn json_schema(schema: &SchemaRef) -> Value {
    let description = schema.describe();
    let mut out = Map::new();

    match description.kind {
        Kind::String => {
            out.insert("type".into(), json!("string"));
            if let Some(min) = description.min {
                out.insert("minLength".into(), json!(min as u64));
            }
            if let Some(max) = description.max {
                out.insert("maxLength".into(), json!(max as u64));
            }
            if let Some(pattern) = description.pattern {
                out.insert("pattern".into(), json!(pattern));
            }
        }
        Kind::Number | Kind::Integer => {
            let name = if description.kind == Kind::Integer {
                "integer"
            } else {
                "number"
            };
            out.insert("type".into(), json!(name));
            if let Some(min) = description.min {
                out.insert("minimum".into(), json!(min));
            }
            if let Some(max) = description.max {
                out.insert("maximum".into(), json!(max));
            }
        }
        Kind::Boolean => {
            out.insert("type".into(), json!("boolean"));
        }
        Kind::Literal | Kind::Enum => {
            if let Some(name) = description.values.first().and_then(primitive_type) {
                out.insert("type".into(), json!(name));
            }
            out.insert("enum".into(), Value::Array(description.values));
        }
        Kind::DateTime => {
            out.insert("type".into(), json!("string"));
            out.insert("format".into(), json!("date-time"));
        }
        Kind::Array => {
            out.insert("type".into(), json!("array"));
            let items = description
                .element
                .as_ref()
                .map(json_schema)
                .unwrap_or_else(|| json!({}));
            out.insert("items".into(), items);
            if let Some(min) = description.min {
                out.insert("minItems".into(), json!(min as u64));
            }
            if let Some(max) = description.max {
                out.insert("maxItems".into(), json!(max as u64));
            }
        }
        Kind::Tuple => {
            // 3.0 has no positional items; describe the union of positions.
            let len = description.items.len();
            let items: Vec<Value> = description.items.iter().map(json_schema).collect();
            out.insert("type".into(), json!("array"));
            out.insert("items".into(), json!({ "anyOf": items }));
            out.insert("minItems".into(), json!(len));
            out.insert("maxItems".into(), json!(len));
        }
        Kind::Object => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (name, field) in &description.fields {
                properties.insert(name.clone(), json_schema(field));
                if !field.describe().optional {
                    required.push(json!(name));
                }
            }
            out.insert("type".into(), json!("object"));
            out.insert("properties".into(), Value::Object(properties));
            if !required.is_empty() {
                out.insert("required".into(), Value::Array(required));
            }
        }
        Kind::Any => {}
    }

    if description.optional {
        out.insert("nullable".into(), json!(true));
    }
    Value::Object(out)
}

fn primitive_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::String(_) => Some("string"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("number"),
        Value::Bool(_) => Some("boolean"),
        _ => None,
    }
}

/// Builds the OpenAPI document for every endpoint in `registry`, served
/// under `base_path`.
pub fn openapi_document(registry: &Registry, info: &ApiInfo, base_path: &str) -> Value {
    let mut paths = Map::new();
    for (name, endpoint) in registry.iter() {
        let route = route::templated_route(&endpoint.route(base_path), |index| {
            format!("p{}", index)
        });
        let method = endpoint.method().as_str().to_ascii_lowercase();
        let item = paths
            .entry(route)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(item) = item {
            item.insert(method, operation(name, endpoint));
        }
    }

    json!({
        "openapi": OPENAPI_VERSION,
        "info": info,
        "paths": paths,
        "components": {
            "schemas": {
                "ErrorBody": {
                    "type": "object",
                    "properties": {
                        "error": { "type": "string" },
                        "zodError": { "type": "object" },
                    },
                    "required": ["error"],
                },
            },
        },
    })
}

fn operation(name: &str, endpoint: &Endpoint) -> Value {
    let mut parameters = Vec::new();
    for (index, item) in endpoint.path_items().iter().enumerate() {
        parameters.push(json!({
            "name": format!("p{}", index),
            "in": "path",
            "required": true,
            "schema": json_schema(item),
        }));
    }
    for (location, schema) in [("query", endpoint.query()), ("header", endpoint.headers())] {
        let Some(schema) = schema else { continue };
        for (field, field_schema) in schema.describe().fields {
            parameters.push(json!({
                "name": field,
                "in": location,
                "required": !field_schema.describe().optional,
                "schema": json_schema(&field_schema),
            }));
        }
    }

    let error_response = json!({
        "content": {
            JSON_CONTENT_TYPE: {
                "schema": { "$ref": "#/components/schemas/ErrorBody" },
            },
        },
    });
    let mut responses = Map::new();
    responses.insert(
        "200".into(),
        json!({
            "description": "Success",
            "content": { JSON_CONTENT_TYPE: { "schema": json_schema(endpoint.response()) } },
        }),
    );
    let mut invalid = error_response.clone();
    invalid["description"] = json!("Invalid request");
    responses.insert("400".into(), invalid);
    let mut internal = error_response;
    internal["description"] = json!("Internal error");
    responses.insert("500".into(), internal);

    let mut op = Map::new();
    op.insert("operationId".into(), json!(name));
    if let Some(summary) = endpoint.summary() {
        op.insert("summary".into(), json!(summary));
    }
    if let Some(description) = endpoint.description() {
        op.insert("description".into(), json!(description));
    }
    if !endpoint.tags().is_empty() {
        op.insert("tags".into(), json!(endpoint.tags()));
    }
    if !parameters.is_empty() {
        op.insert("parameters".into(), Value::Array(parameters));
    }
    if let Some(body) = endpoint.body() {
        op.insert(
            "requestBody".into(),
            json!({
                "required": true,
                "content": { JSON_CONTENT_TYPE: { "schema": json_schema(body) } },
            }),
        );
    }
    op.insert("responses".into(), Value::Object(responses));
    Value::Object(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractkit_core::{IntoSchema, schema};

    #[test]
    fn scalar_schemas() {
        let s = schema::string().min(1).max(10).into_schema();
        assert_eq!(
            json_schema(&s),
            json!({ "type": "string", "minLength": 1, "maxLength": 10 })
        );
        assert_eq!(
            json_schema(&schema::integer().coerce().min(0.0).into_schema()),
            json!({ "type": "integer", "minimum": 0.0 })
        );
        assert_eq!(
            json_schema(&schema::enumeration(["a", "b"]).into_schema()),
            json!({ "type": "string", "enum": ["a", "b"] })
        );
        assert_eq!(
            json_schema(&schema::literal(3).into_schema()),
            json!({ "type": "integer", "enum": [3] })
        );
        assert_eq!(
            json_schema(&schema::datetime().into_schema()),
            json!({ "type": "string", "format": "date-time" })
        );
        assert_eq!(json_schema(&schema::any().into_schema()), json!({}));
    }

    #[test]
    fn object_schema_lists_required_fields() {
        let s = schema::object()
            .field("name", schema::string())
            .field("nickname", schema::optional(schema::string()))
            .into_schema();
        assert_eq!(
            json_schema(&s),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "nickname": { "type": "string", "nullable": true },
                },
                "required": ["name"],
            })
        );
    }

    #[test]
    fn document_covers_every_channel() {
        let registry = Registry::builder()
            .endpoint(
                "getPerson",
                Endpoint::get("/people", schema::object().field("success", schema::boolean()))
                    .with_summary("Look up a person")
                    .with_additional_paths(
                        schema::tuple()
                            .item(schema::enumeration(["Bob", "Douglas", "Jeremy"]))
                            .item(schema::enumeration(["Smith", "Jones", "Williams"])),
                    )
                    .with_query(schema::object().field("verbose", schema::optional(schema::boolean().coerce())))
                    .with_headers(schema::object().field("authorization", schema::string())),
            )
            .endpoint(
                "createPerson",
                Endpoint::post("/people", schema::any())
                    .with_body(schema::object().field("name", schema::string())),
            )
            .build()
            .unwrap();

        let doc = openapi_document(&registry, &ApiInfo::new("People", "1.0.0"), "/api");
        assert_eq!(doc["openapi"], "3.0.3");
        assert_eq!(doc["info"], json!({ "title": "People", "version": "1.0.0" }));

        let get = &doc["paths"]["/api/people/{p0}/{p1}"]["get"];
        assert_eq!(get["operationId"], "getPerson");
        assert_eq!(get["summary"], "Look up a person");
        let params = get["parameters"].as_array().unwrap();
        let names: Vec<&str> = params.iter().map(|p| p["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["p0", "p1", "verbose", "authorization"]);
        assert_eq!(params[2]["required"], false);
        assert_eq!(params[3]["in"], "header");
        assert_eq!(
            get["responses"]["400"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorBody"
        );

        let post = &doc["paths"]["/api/people"]["post"];
        assert_eq!(post["operationId"], "createPerson");
        assert_eq!(
            post["requestBody"]["content"]["application/json"]["schema"]["required"],
            json!(["name"])
        );
        assert!(post.get("parameters").is_none());
    }
}
