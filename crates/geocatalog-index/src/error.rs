//! Index error types

use geocatalog_client::ClientError;
use thiserror::Error;

/// Result type alias for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Index-specific error types
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Config(#[from] geocatalog_core::Error),

    #[error("Spatial service error: {0}")]
    Client(#[from] ClientError),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Nothing to index in {0}")]
    NotIndexable(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl IndexError {
    /// Deployment mistakes that must not be masked
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Failures of the remote service, which indexes degrade around
    pub fn is_service(&self) -> bool {
        matches!(self, Self::Client(_))
    }
}
