//! Subcommand implementations.

pub mod config;
pub mod docs;
pub mod people;
pub mod serve;
