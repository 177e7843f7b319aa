//! Error types for Geocatalog Core

use thiserror::Error;

/// Result type alias using Geocatalog's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Geocatalog core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("No spatial service URI provided")]
    NoUri,

    #[error("Environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("Invalid point {0:?}: expected a pair of decimal numbers such as 12.5,41.9")]
    InvalidPoint(String),

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
