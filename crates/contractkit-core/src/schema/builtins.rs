//! Built-in schema implementations.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Number, Value};

use super::{
    Description, IntoSchema, IssueCode, Kind, ParseContext, Schema, SchemaRef, WireForm,
    type_name,
};

fn expected(ctx: &mut ParseContext, what: &str, input: &Value) {
    ctx.issue(
        IssueCode::InvalidType,
        format!("Expected {}, received {}", what, type_name(input)),
    );
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// String schema with optional length and pattern constraints.
#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    min: Option<usize>,
    max: Option<usize>,
    pattern: Option<Regex>,
}

/// Creates a string schema.
pub fn string() -> StringSchema {
    StringSchema::default()
}

impl StringSchema {
    /// Builder: minimum length in characters.
    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    /// Builder: maximum length in characters.
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Builder: require the value to match `pattern`.
    pub fn regex(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

impl Schema for StringSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let Value::String(s) = input else {
            expected(ctx, "string", input);
            return None;
        };

        let len = s.chars().count();
        let mut ok = true;
        if let Some(min) = self.min
            && len < min
        {
            ctx.issue(
                IssueCode::TooSmall,
                format!("String must contain at least {} character(s)", min),
            );
            ok = false;
        }
        if let Some(max) = self.max
            && len > max
        {
            ctx.issue(
                IssueCode::TooBig,
                format!("String must contain at most {} character(s)", max),
            );
            ok = false;
        }
        if let Some(ref pattern) = self.pattern
            && !pattern.is_match(s)
        {
            ctx.issue(
                IssueCode::InvalidString,
                format!("String must match pattern {}", pattern.as_str()),
            );
            ok = false;
        }

        ok.then(|| input.clone())
    }

    fn describe(&self) -> Description {
        let mut description = Description::new(Kind::String, WireForm::Scalar);
        description.pattern = self.pattern.as_ref().map(|p| p.as_str().to_string());
        description.min = self.min.map(|m| m as f64);
        description.max = self.max.map(|m| m as f64);
        description
    }
}

/// Number schema; optionally integer-only and coercing from strings.
#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    integer: bool,
    coerce: bool,
    min: Option<f64>,
    max: Option<f64>,
}

/// Creates a number schema.
pub fn number() -> NumberSchema {
    NumberSchema::default()
}

/// Creates an integer schema.
pub fn integer() -> NumberSchema {
    NumberSchema {
        integer: true,
        ..Default::default()
    }
}

impl NumberSchema {
    /// Builder: accept numeric strings (required for path, query and
    /// header channels).
    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    /// Builder: inclusive minimum.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Builder: inclusive maximum.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    fn parse_wire(s: &str) -> Option<Value> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        // Integers keep their integral representation so they round-trip.
        if let Ok(i) = s.parse::<i64>() {
            return Some(Value::from(i));
        }
        s.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }
}

impl Schema for NumberSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let value = match input {
            Value::Number(_) => input.clone(),
            Value::String(s) if self.coerce => match Self::parse_wire(s) {
                Some(value) => value,
                None => {
                    ctx.issue(
                        IssueCode::InvalidType,
                        format!("Expected number, received \"{}\"", s),
                    );
                    return None;
                }
            },
            _ => {
                expected(ctx, "number", input);
                return None;
            }
        };

        let n = value.as_f64()?;
        let mut ok = true;
        if self.integer && n.fract() != 0.0 {
            ctx.issue(IssueCode::InvalidType, "Expected integer, received float");
            ok = false;
        }
        if let Some(min) = self.min
            && n < min
        {
            ctx.issue(
                IssueCode::TooSmall,
                format!("Number must be greater than or equal to {}", min),
            );
            ok = false;
        }
        if let Some(max) = self.max
            && n > max
        {
            ctx.issue(
                IssueCode::TooBig,
                format!("Number must be less than or equal to {}", max),
            );
            ok = false;
        }

        ok.then_some(value)
    }

    fn describe(&self) -> Description {
        let kind = if self.integer {
            Kind::Integer
        } else {
            Kind::Number
        };
        let wire = if self.coerce {
            WireForm::Scalar
        } else {
            WireForm::Structured
        };
        let mut description = Description::new(kind, wire);
        description.min = self.min;
        description.max = self.max;
        description
    }
}

/// Boolean schema; optionally coercing from `"true"` / `"false"`.
#[derive(Debug, Clone, Default)]
pub struct BooleanSchema {
    coerce: bool,
}

/// Creates a boolean schema.
pub fn boolean() -> BooleanSchema {
    BooleanSchema::default()
}

impl BooleanSchema {
    /// Builder: accept `"true"` and `"false"` strings.
    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }
}

impl Schema for BooleanSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        match input {
            Value::Bool(_) => Some(input.clone()),
            Value::String(s) if self.coerce && s == "true" => Some(Value::Bool(true)),
            Value::String(s) if self.coerce && s == "false" => Some(Value::Bool(false)),
            _ => {
                expected(ctx, "boolean", input);
                None
            }
        }
    }

    fn describe(&self) -> Description {
        let wire = if self.coerce {
            WireForm::Scalar
        } else {
            WireForm::Structured
        };
        Description::new(Kind::Boolean, wire)
    }
}

/// Schema accepting exactly one value.
///
/// Number and boolean literals also accept their string spelling, so they
/// can travel through path segments, query parameters and headers.
#[derive(Debug, Clone)]
pub struct LiteralSchema {
    value: Value,
}

/// Creates a literal schema.
pub fn literal(value: impl Into<Value>) -> LiteralSchema {
    LiteralSchema {
        value: value.into(),
    }
}

impl Schema for LiteralSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        if *input == self.value {
            return Some(input.clone());
        }
        if let Value::String(s) = input
            && matches!(self.value, Value::Number(_) | Value::Bool(_))
            && *s == self.value.to_string()
        {
            return Some(self.value.clone());
        }
        ctx.issue(
            IssueCode::InvalidLiteral,
            format!("Invalid literal value, expected {}", self.value),
        );
        None
    }

    fn describe(&self) -> Description {
        let wire = match self.value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => WireForm::Scalar,
            _ => WireForm::Structured,
        };
        let mut description = Description::new(Kind::Literal, wire);
        description.values = vec![self.value.clone()];
        description
    }
}

/// Schema accepting one of a fixed set of strings.
#[derive(Debug, Clone)]
pub struct EnumSchema {
    members: Vec<String>,
}

/// Creates a string enum schema.
pub fn enumeration<I, S>(members: I) -> EnumSchema
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    EnumSchema {
        members: members.into_iter().map(Into::into).collect(),
    }
}

impl Schema for EnumSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        if let Value::String(s) = input
            && self.members.iter().any(|m| m == s)
        {
            return Some(input.clone());
        }
        let options: Vec<String> = self.members.iter().map(|m| format!("'{}'", m)).collect();
        let received = match input {
            Value::String(s) => format!("'{}'", s),
            other => type_name(other).to_string(),
        };
        ctx.issue(
            IssueCode::InvalidEnumValue,
            format!(
                "Invalid enum value. Expected {}, received {}",
                options.join(" | "),
                received
            ),
        );
        None
    }

    fn describe(&self) -> Description {
        let mut description = Description::new(Kind::Enum, WireForm::Scalar);
        description.values = self.members.iter().cloned().map(Value::String).collect();
        description
    }
}

/// RFC 3339 date-time string, normalized to UTC.
#[derive(Debug, Clone, Default)]
pub struct DateTimeSchema;

/// Creates a date-time schema.
pub fn datetime() -> DateTimeSchema {
    DateTimeSchema
}

impl Schema for DateTimeSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let Value::String(s) = input else {
            expected(ctx, "date-time string", input);
            return None;
        };
        match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(Value::String(
                dt.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
            Err(e) => {
                ctx.issue(IssueCode::InvalidDate, format!("Invalid datetime: {}", e));
                None
            }
        }
    }

    fn describe(&self) -> Description {
        Description::new(Kind::DateTime, WireForm::Scalar)
    }
}

/// Accepts any value unchanged.
#[derive(Debug, Clone, Default)]
pub struct AnySchema;

/// Creates a schema accepting anything.
pub fn any() -> AnySchema {
    AnySchema
}

impl Schema for AnySchema {
    fn validate(&self, input: &Value, _ctx: &mut ParseContext) -> Option<Value> {
        Some(input.clone())
    }

    fn describe(&self) -> Description {
        Description::new(Kind::Any, WireForm::Scalar)
    }
}

// ---------------------------------------------------------------------------
// Wrappers and composites
// ---------------------------------------------------------------------------

/// Makes the inner schema accept `null` and allows the key to be absent
/// when used as an object field.
#[derive(Debug, Clone)]
pub struct OptionalSchema {
    inner: SchemaRef,
}

/// Wraps `inner` so it may be absent.
pub fn optional(inner: impl IntoSchema) -> OptionalSchema {
    OptionalSchema {
        inner: inner.into_schema(),
    }
}

impl Schema for OptionalSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        if input.is_null() {
            return Some(Value::Null);
        }
        self.inner.validate(input, ctx)
    }

    fn describe(&self) -> Description {
        let mut description = self.inner.describe();
        description.optional = true;
        description
    }
}

/// Homogeneous list.
#[derive(Debug, Clone)]
pub struct ArraySchema {
    element: SchemaRef,
    min: Option<usize>,
    max: Option<usize>,
}

/// Creates an array schema.
pub fn array(element: impl IntoSchema) -> ArraySchema {
    ArraySchema {
        element: element.into_schema(),
        min: None,
        max: None,
    }
}

impl ArraySchema {
    /// Builder: minimum number of elements.
    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    /// Builder: maximum number of elements.
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }
}

impl Schema for ArraySchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let Value::Array(items) = input else {
            expected(ctx, "array", input);
            return None;
        };

        let mut ok = true;
        if let Some(min) = self.min
            && items.len() < min
        {
            ctx.issue(
                IssueCode::TooSmall,
                format!("Array must contain at least {} element(s)", min),
            );
            ok = false;
        }
        if let Some(max) = self.max
            && items.len() > max
        {
            ctx.issue(
                IssueCode::TooBig,
                format!("Array must contain at most {} element(s)", max),
            );
            ok = false;
        }

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match ctx.at(index, |ctx| self.element.validate(item, ctx)) {
                Some(value) => out.push(value),
                None => ok = false,
            }
        }

        ok.then_some(Value::Array(out))
    }

    fn describe(&self) -> Description {
        let wire = if self.element.describe().wire == WireForm::Scalar {
            WireForm::Repeated
        } else {
            WireForm::Structured
        };
        let mut description = Description::new(Kind::Array, wire);
        description.element = Some(self.element.clone());
        description.min = self.min.map(|m| m as f64);
        description.max = self.max.map(|m| m as f64);
        description
    }
}

/// Fixed-length, positionally typed list.
#[derive(Debug, Clone, Default)]
pub struct TupleSchema {
    items: Vec<SchemaRef>,
}

/// Creates an empty tuple schema; add positions with [`TupleSchema::item`].
pub fn tuple() -> TupleSchema {
    TupleSchema::default()
}

impl TupleSchema {
    /// Builder: append a position.
    pub fn item(mut self, schema: impl IntoSchema) -> Self {
        self.items.push(schema.into_schema());
        self
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the tuple has no positions.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Schema for TupleSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let Value::Array(values) = input else {
            expected(ctx, "array", input);
            return None;
        };

        if values.len() < self.items.len() {
            ctx.issue(
                IssueCode::TooSmall,
                format!(
                    "Array must contain at least {} element(s)",
                    self.items.len()
                ),
            );
            return None;
        }
        if values.len() > self.items.len() {
            ctx.issue(
                IssueCode::TooBig,
                format!("Array must contain at most {} element(s)", self.items.len()),
            );
            return None;
        }

        let mut ok = true;
        let mut out = Vec::with_capacity(values.len());
        for (index, (schema, value)) in self.items.iter().zip(values).enumerate() {
            match ctx.at(index, |ctx| schema.validate(value, ctx)) {
                Some(value) => out.push(value),
                None => ok = false,
            }
        }

        ok.then_some(Value::Array(out))
    }

    fn describe(&self) -> Description {
        let mut description = Description::new(Kind::Tuple, WireForm::Structured);
        description.items = self.items.clone();
        description
    }
}

/// Keyed record. Unknown keys are stripped unless the schema is strict.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, SchemaRef)>,
    strict: bool,
}

/// Creates an empty object schema; add keys with [`ObjectSchema::field`].
pub fn object() -> ObjectSchema {
    ObjectSchema::default()
}

impl ObjectSchema {
    /// Builder: declare a field. Redeclaring a key replaces it in place.
    pub fn field(mut self, name: impl Into<String>, schema: impl IntoSchema) -> Self {
        let name = name.into();
        let schema = schema.into_schema();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = schema,
            None => self.fields.push((name, schema)),
        }
        self
    }

    /// Builder: reject keys that are not declared.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value> {
        let Value::Object(map) = input else {
            expected(ctx, "object", input);
            return None;
        };

        let mut ok = true;
        let mut out = Map::new();
        for (key, schema) in &self.fields {
            match map.get(key) {
                None => {
                    if !schema.describe().optional {
                        ctx.at(key.as_str(), |ctx| {
                            ctx.issue(IssueCode::InvalidType, "Required")
                        });
                        ok = false;
                    }
                }
                Some(value) => match ctx.at(key.as_str(), |ctx| schema.validate(value, ctx)) {
                    Some(parsed) => {
                        out.insert(key.clone(), parsed);
                    }
                    None => ok = false,
                },
            }
        }

        if self.strict {
            let unknown: Vec<&str> = map
                .keys()
                .filter(|k| !self.fields.iter().any(|(key, _)| key == *k))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                ctx.issue(
                    IssueCode::UnrecognizedKeys,
                    format!("Unrecognized key(s) in object: {}", unknown.join(", ")),
                );
                ok = false;
            }
        }

        ok.then_some(Value::Object(out))
    }

    fn describe(&self) -> Description {
        let mut description = Description::new(Kind::Object, WireForm::Structured);
        description.fields = self.fields.clone();
        description
    }
}

/// Merges two object schemas; fields of `overlay` win on key collision.
///
/// Returns `None` if either schema does not describe itself as an object.
pub fn merge_objects(base: &SchemaRef, overlay: &SchemaRef) -> Option<SchemaRef> {
    let base = base.describe();
    let overlay = overlay.describe();
    if base.kind != Kind::Object || overlay.kind != Kind::Object {
        return None;
    }

    let merged = base
        .fields
        .into_iter()
        .chain(overlay.fields)
        .fold(object(), |merged, (key, schema)| merged.field(key, schema));
    Some(merged.into_schema())
}
