//! Catalog index traits

use async_trait::async_trait;
use geocatalog_core::{DocumentId, IndexRequest, Indexable, Principal};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::registry::StorageConnection;
use crate::spatial::SpatialIndex;
use crate::transaction::Transaction;

pub use crate::error::{IndexError, IndexResult as Result};

/// Everything an index call needs from the host
#[derive(Debug, Clone)]
pub struct IndexContext {
    /// Storage connection the index was loaded through, if it is stored
    pub storage: Option<Arc<StorageConnection>>,

    /// Transaction writes are made in
    pub transaction: Transaction,

    /// User the request runs for
    pub principal: Principal,
}

impl IndexContext {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            storage: None,
            transaction,
            principal: Principal::anonymous(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<StorageConnection>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }
}

/// Document ids matched by an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSet {
    /// Ids with integer relevance scores
    Scored(BTreeMap<DocumentId, u32>),
    /// Unranked ids
    Ids(BTreeSet<DocumentId>),
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            Self::Scored(m) => m.len(),
            Self::Ids(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        match self {
            Self::Scored(m) => m.contains_key(&id),
            Self::Ids(s) => s.contains(&id),
        }
    }

    pub fn score(&self, id: DocumentId) -> Option<u32> {
        match self {
            Self::Scored(m) => m.get(&id).copied(),
            Self::Ids(_) => None,
        }
    }

    pub fn ids(&self) -> BTreeSet<DocumentId> {
        match self {
            Self::Scored(m) => m.keys().copied().collect(),
            Self::Ids(s) => s.clone(),
        }
    }
}

/// What an index contributes to a catalog search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedIndex {
    pub results: ResultSet,

    /// Fields of the request this index resolved
    pub fields: Vec<String>,
}

/// Index contract of the catalog.
///
/// Write failures are reported as `false` and query failures as `None`;
/// only configuration and transaction errors come back as `Err`.
#[async_trait]
pub trait PluggableIndex: Send + Sync {
    fn id(&self) -> String;

    /// Attribute names read from indexed content
    fn index_source_names(&self) -> Vec<String> {
        vec![self.id()]
    }

    async fn index_object(
        &self,
        ctx: &IndexContext,
        document_id: DocumentId,
        obj: &dyn Indexable,
    ) -> Result<bool>;

    async fn unindex_object(&self, ctx: &IndexContext, document_id: DocumentId) -> Result<bool>;

    /// Apply the part of `request` addressed to this index. `None` means the
    /// index is not relevant to the request or could not answer it.
    async fn apply_index(
        &self,
        ctx: &IndexContext,
        request: &IndexRequest,
    ) -> Result<Option<AppliedIndex>>;

    /// Number of distinct indexed values
    async fn num_objects(&self) -> usize {
        0
    }

    /// Number of indexed documents
    async fn index_size(&self, ctx: &IndexContext) -> Result<u64>;

    async fn clear(&self, ctx: &IndexContext) -> Result<bool>;
}

/// The catalog the indexes live in
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Spatial index registered under `id`
    fn spatial_index(&self, id: &str) -> Option<Arc<SpatialIndex>>;

    /// Documents visible to any of the `allowed` roles and users
    async fn permitted_documents(&self, allowed: &[String]) -> Result<BTreeSet<DocumentId>>;

    /// Record id of the document at a physical path
    fn record_id(&self, path: &str) -> Option<DocumentId>;

    /// Physical path of the site root
    fn site_root(&self) -> String;
}
