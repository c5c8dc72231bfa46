//! Validation issues reported by schemas.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step in the location of an issue inside the validated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array or tuple index.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Machine-readable category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// The value has the wrong JSON type, or a required key is missing.
    InvalidType,
    /// The value does not equal the expected literal.
    InvalidLiteral,
    /// The value is not one of the enumerated members.
    InvalidEnumValue,
    /// Below a minimum length, size or value.
    TooSmall,
    /// Above a maximum length, size or value.
    TooBig,
    /// A string failed a pattern check.
    InvalidString,
    /// A date/time string could not be parsed.
    InvalidDate,
    /// A strict object received keys it does not declare.
    UnrecognizedKeys,
    /// Raised by user-defined schemas.
    Custom,
}

/// A single validation failure at a location inside the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Category of the failure.
    pub code: IssueCode,
    /// Location of the offending value, from the root.
    pub path: Vec<PathSegment>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            let path: Vec<String> = self.path.iter().map(ToString::to_string).collect();
            write!(f, "{}: {}", path.join("."), self.message)
        }
    }
}

/// Structured diagnostic returned when a value fails validation.
///
/// Serializes as `{"issues": [...]}`, which is the diagnostic carried in
/// 400 responses and in client-side schema mismatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("validation failed: {}", summarize(.issues))]
pub struct SchemaError {
    /// Every issue found, in discovery order.
    pub issues: Vec<Issue>,
}

impl SchemaError {
    /// Creates an error with a single issue at the root.
    pub fn root(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue {
                code,
                path: Vec::new(),
                message: message.into(),
            }],
        }
    }

    /// Returns the diagnostic as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn summarize(issues: &[Issue]) -> String {
    let parts: Vec<String> = issues.iter().map(ToString::to_string).collect();
    parts.join("; ")
}
