//! Client error types

use thiserror::Error;

/// Result type alias for spatial service calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Spatial service client errors.
///
/// `Unreachable` means the request never got an answer; `Http` means the
/// service answered and rejected it.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Spatial service unreachable: {0}")]
    Unreachable(String),

    #[error("Spatial service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Incomplete result: fetched {fetched} of {hits} hits in {pages} pages")]
    IncompleteResult {
        fetched: usize,
        hits: usize,
        pages: usize,
    },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Client setup error: {0}")]
    Setup(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of a rejected request
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
