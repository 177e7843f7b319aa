//! Spatial service trait definitions

use crate::error::ClientResult;
use async_trait::async_trait;
use geocatalog_core::{
    BatchRequest, DocumentId, IndexConfig, IndexRecord, QuerySpec, ScoredItem, ServiceStats,
};
use std::time::Duration;

/// Everything needed to open a connection to the spatial service
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub uri: String,

    /// Items per response page; 0 lets the service decide
    pub page_size: usize,

    pub timeout: Duration,

    /// Upper bound on pages fetched for one query
    pub max_pages: usize,
}

impl ConnectionSettings {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            page_size: 0,
            timeout: Duration::from_secs(geocatalog_core::DEFAULT_TIMEOUT_SECS),
            max_pages: geocatalog_core::DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Resolve settings from an index configuration.
    ///
    /// Fails when no URI is configured or the URI variable is unset.
    pub fn from_config(config: &IndexConfig) -> geocatalog_core::Result<Self> {
        Ok(Self::new(config.effective_uri()?)
            .with_page_size(config.response_page_size)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_pages(config.max_pages))
    }
}

/// Operations offered by a spatial index service.
///
/// Each call is independent; implementations hold no per-transaction state.
#[async_trait]
pub trait SpatialService: Send + Sync {
    /// Base URI of the service
    fn uri(&self) -> &str;

    /// Service statistics (`GET {base}`)
    async fn info(&self) -> ClientResult<ServiceStats>;

    /// Records stored for a document (`GET {base}/items/{id}`)
    async fn items(&self, document_id: DocumentId) -> ClientResult<Vec<IndexRecord>>;

    /// All hits for a query, following pagination
    async fn query(&self, spec: &QuerySpec) -> ClientResult<Vec<ScoredItem>>;

    /// Send index/unindex/clear operations (`POST {base}`)
    async fn batch(&self, request: &BatchRequest) -> ClientResult<()>;

    /// Drop everything stored in the service
    async fn clear(&self) -> ClientResult<()> {
        self.batch(&BatchRequest::clear()).await
    }

    /// The service has no commit step; present for the transaction protocol
    async fn commit(&self) -> ClientResult<()> {
        Ok(())
    }

    /// Release the connection
    async fn close(&self) {}
}
