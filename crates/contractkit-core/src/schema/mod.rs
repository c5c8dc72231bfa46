//! Schema capability used by every contract channel.
//!
//! A [`Schema`] validates a JSON value and produces the (possibly coerced)
//! output value. Schemas are also introspectable through
//! [`Schema::describe`], which is how route placeholders are counted, header
//! schemas are merged and documentation is generated, without ever looking
//! into a particular schema implementation.
//!
//! The constructors in this module ([`string`], [`object`], [`tuple`], ...)
//! cover what endpoint contracts usually need. Anything else can be plugged
//! in by implementing [`Schema`].
//!
//! ```rust
//! use contractkit_core::schema::{self, Schema};
//! use serde_json::json;
//!
//! let person = schema::object()
//!     .field("name", schema::string().min(1))
//!     .field("age", schema::integer().coerce());
//!
//! let parsed = person.parse(&json!({"name": "Bob", "age": "42"})).unwrap();
//! assert_eq!(parsed, json!({"name": "Bob", "age": 42}));
//! ```

mod builtins;
mod error;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use builtins::{
    AnySchema, ArraySchema, BooleanSchema, DateTimeSchema, EnumSchema, LiteralSchema,
    NumberSchema, ObjectSchema, OptionalSchema, StringSchema, TupleSchema, any, array, boolean,
    datetime, enumeration, integer, literal, merge_objects, number, object, optional, string,
    tuple,
};
pub use error::{Issue, IssueCode, PathSegment, SchemaError};

/// Shared, type-erased schema.
pub type SchemaRef = Arc<dyn Schema>;

/// A validating, transforming description of a JSON value.
pub trait Schema: fmt::Debug + Send + Sync {
    /// Validates `input`, recording issues in `ctx` at its current path.
    ///
    /// Returns the output value, or `None` when the input is rejected.
    fn validate(&self, input: &Value, ctx: &mut ParseContext) -> Option<Value>;

    /// Describes the shape of this schema.
    fn describe(&self) -> Description;

    /// Validates `input` from the root and returns the output value.
    fn parse(&self, input: &Value) -> Result<Value, SchemaError> {
        let mut ctx = ParseContext::default();
        match self.validate(input, &mut ctx) {
            Some(value) if ctx.issues.is_empty() => Ok(value),
            _ => Err(ctx.into_error()),
        }
    }
}

/// Conversion into a shared [`SchemaRef`].
pub trait IntoSchema {
    /// Wraps `self` into a [`SchemaRef`].
    fn into_schema(self) -> SchemaRef;
}

impl<S: Schema + 'static> IntoSchema for S {
    fn into_schema(self) -> SchemaRef {
        Arc::new(self)
    }
}

impl IntoSchema for SchemaRef {
    fn into_schema(self) -> SchemaRef {
        self
    }
}

/// Accumulates issues and tracks the location being validated.
#[derive(Debug, Default)]
pub struct ParseContext {
    path: Vec<PathSegment>,
    issues: Vec<Issue>,
}

impl ParseContext {
    /// Records an issue at the current path.
    pub fn issue(&mut self, code: IssueCode, message: impl Into<String>) {
        self.issues.push(Issue {
            code,
            path: self.path.clone(),
            message: message.into(),
        });
    }

    /// Runs `f` with `segment` appended to the current path.
    pub fn at<T>(
        &mut self,
        segment: impl Into<PathSegment>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.path.push(segment.into());
        let out = f(self);
        self.path.pop();
        out
    }

    /// Returns true if no issue has been recorded yet.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Converts the recorded issues into a [`SchemaError`].
    pub fn into_error(self) -> SchemaError {
        if self.issues.is_empty() {
            return SchemaError::root(IssueCode::Custom, "Invalid input");
        }
        SchemaError {
            issues: self.issues,
        }
    }
}

/// Broad category of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    String,
    Number,
    Integer,
    Boolean,
    Literal,
    Enum,
    DateTime,
    Array,
    Tuple,
    Object,
    Any,
}

/// How a schema relates to the string-only wire channels (path, query,
/// headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireForm {
    /// A single wire string parses with this schema.
    Scalar,
    /// A list of wire strings parses with this schema (array of scalars).
    Repeated,
    /// Cannot be fed wire strings directly; needs a converter.
    Structured,
}

/// Introspected shape of a schema.
#[derive(Debug, Clone)]
pub struct Description {
    pub kind: Kind,
    pub optional: bool,
    pub wire: WireForm,
    /// Object fields, in declaration order.
    pub fields: Vec<(String, SchemaRef)>,
    /// Tuple items, in order.
    pub items: Vec<SchemaRef>,
    /// Array element schema.
    pub element: Option<SchemaRef>,
    /// Members of an enum, or the single value of a literal.
    pub values: Vec<Value>,
    /// Regex constraint on strings.
    pub pattern: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Description {
    /// Creates a description with no children.
    pub fn new(kind: Kind, wire: WireForm) -> Self {
        Self {
            kind,
            optional: false,
            wire,
            fields: Vec::new(),
            items: Vec::new(),
            element: None,
            values: Vec::new(),
            pattern: None,
            min: None,
            max: None,
        }
    }

    /// Returns the schema of the named object field.
    pub fn field(&self, name: &str) -> Option<&SchemaRef> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, schema)| schema)
    }
}

/// Returns the JSON type name of a value, for issue messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
