//! Core types: schema capability, validation issues, tracing setup

pub mod schema;
pub mod tracing;

pub use schema::{
    Description, IntoSchema, Issue, IssueCode, Kind, ParseContext, PathSegment, Schema,
    SchemaError, SchemaRef, WireForm,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
