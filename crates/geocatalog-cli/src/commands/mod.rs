//! CLI command implementations

pub mod completions;
pub mod config;
pub mod document;
pub mod query;
pub mod service;
