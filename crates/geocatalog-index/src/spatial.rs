//! Spatial index backed by a remote spatial service

use async_trait::async_trait;
use geocatalog_client::{ConnectionSettings, SpatialService};
use geocatalog_core::{
    relative_path, BatchRequest, ConfigUpdate, DocumentId, IndexConfig, IndexEntry, IndexRecord,
    IndexRequest, Indexable, QuerySpec, RecordProperties, ScoredItem, ServiceStats,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use ulid::Ulid;

use crate::connection::{http_factory, ConnectionFactory, ConnectionManager};
use crate::error::{IndexError, IndexResult};
use crate::traits::{AppliedIndex, IndexContext, PluggableIndex, ResultSet};

/// Catalog index whose documents live in a spatial service.
///
/// The index keeps no data of its own. Each document is sent to the service
/// with its geometry, box and descriptive properties, and queries are
/// answered by the service.
pub struct SpatialIndex {
    config: RwLock<IndexConfig>,

    /// Persistent identity, once the index is stored
    oid: Option<Ulid>,

    factory: ConnectionFactory,

    /// Manager used while the index has no persistent identity
    temp_manager: Mutex<Option<Arc<ConnectionManager>>>,
}

impl SpatialIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config: RwLock::new(config),
            oid: None,
            factory: http_factory(),
            temp_manager: Mutex::new(None),
        }
    }

    /// Index `id` talking to the service at `uri`
    pub fn with_uri(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(IndexConfig::new(id).with_uri(uri))
    }

    pub fn with_factory(mut self, factory: ConnectionFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_oid(mut self, oid: Ulid) -> Self {
        self.oid = Some(oid);
        self
    }

    pub fn oid(&self) -> Option<Ulid> {
        self.oid
    }

    pub fn config(&self) -> IndexResult<IndexConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|e| IndexError::Lock(e.to_string()))
    }

    fn update_config(&self, update: impl FnOnce(&mut IndexConfig)) -> IndexResult<()> {
        let mut config = self
            .config
            .write()
            .map_err(|e| IndexError::Lock(e.to_string()))?;
        update(&mut config);
        Ok(())
    }

    pub fn set_uri_static(&self, uri: impl Into<String>) -> IndexResult<()> {
        let uri = uri.into();
        self.update_config(|c| c.uri_static = uri)
    }

    pub fn set_uri_env_var(&self, name: impl Into<String>) -> IndexResult<()> {
        let name = name.into();
        self.update_config(|c| c.uri_env_var = name)
    }

    pub fn set_page_size(&self, page_size: usize) -> IndexResult<()> {
        self.update_config(|c| c.response_page_size = page_size)
    }

    pub fn set_site_root(&self, root: impl Into<String>) -> IndexResult<()> {
        let root = root.into();
        self.update_config(|c| c.site_root = root)
    }

    /// Current settings as data
    pub fn export_config(&self) -> IndexResult<ConfigUpdate> {
        Ok(ConfigUpdate::from(&self.config()?))
    }

    /// Apply imported settings, optionally resetting the others first and
    /// optionally clearing the remote index afterwards
    pub async fn import_config(
        &self,
        ctx: &IndexContext,
        update: &ConfigUpdate,
        purge: bool,
        clear: bool,
    ) -> IndexResult<()> {
        self.update_config(|c| update.apply(c, purge))?;
        let config = self.config()?;
        tracing::info!(
            "Imported configuration for {} (uri={:?}, env={:?})",
            config.id,
            config.uri_static,
            config.uri_env_var
        );
        if clear && !self.clear(ctx).await? {
            tracing::warn!("Index {} could not be cleared after import", config.id);
        }
        Ok(())
    }

    fn settings(&self) -> IndexResult<ConnectionSettings> {
        Ok(ConnectionSettings::from_config(&self.config()?)?)
    }

    /// The connection manager for this index in `ctx`.
    ///
    /// A stored index shares its manager through the storage connection;
    /// otherwise the index keeps one itself. Either way the manager is
    /// replaced once the connection settings change.
    pub fn connection_manager(&self, ctx: &IndexContext) -> IndexResult<Arc<ConnectionManager>> {
        let settings = self.settings()?;

        if let (Some(oid), Some(storage)) = (self.oid, ctx.storage.as_ref()) {
            return storage.manager_for(oid, settings, &self.factory);
        }

        let mut temp = self
            .temp_manager
            .lock()
            .map_err(|e| IndexError::Lock(e.to_string()))?;
        if let Some(manager) = temp.as_ref() {
            if manager.settings() == &settings {
                return Ok(manager.clone());
            }
        }
        let manager = Arc::new(ConnectionManager::new(settings, self.factory.clone())?);
        *temp = Some(manager.clone());
        Ok(manager)
    }

    fn connection(&self, ctx: &IndexContext) -> IndexResult<Arc<dyn SpatialService>> {
        self.connection_manager(ctx)?.connection()
    }

    /// Service failures become `fallback`; everything else propagates
    fn degrade<T>(&self, result: IndexResult<T>, fallback: T, action: &str) -> IndexResult<T> {
        match result {
            Err(e) if e.is_service() => {
                tracing::warn!("{} failed to {}: {}", self.id(), action, e);
                Ok(fallback)
            }
            other => other,
        }
    }

    fn build_record(&self, document_id: DocumentId, obj: &dyn Indexable) -> IndexResult<IndexRecord> {
        let config = self.config()?;
        let path = obj.physical_path();
        let geo = obj
            .geo_attribute(&config.id)
            .ok_or_else(|| IndexError::NotIndexable(path.clone()))?;

        let properties = RecordProperties {
            path: relative_path(&config.site_root, &path),
            pid: obj.parent_id(),
            title: obj.title(),
            description: obj.description(),
        };
        Ok(IndexRecord::new(document_id, geo.geometry(), geo.bounds()).with_properties(properties))
    }

    async fn write(&self, ctx: &IndexContext, request: BatchRequest) -> IndexResult<()> {
        let manager = self.connection_manager(ctx)?;
        manager.set_changed(&ctx.transaction)?;
        manager.connection()?.batch(&request).await?;
        Ok(())
    }

    async fn stored_records(
        &self,
        ctx: &IndexContext,
        document_id: DocumentId,
    ) -> IndexResult<Vec<IndexRecord>> {
        Ok(self.connection(ctx)?.items(document_id).await?)
    }

    async fn run_query(&self, ctx: &IndexContext, spec: &QuerySpec) -> IndexResult<Vec<ScoredItem>> {
        Ok(self.connection(ctx)?.query(spec).await?)
    }

    async fn stats(&self, ctx: &IndexContext) -> IndexResult<ServiceStats> {
        Ok(self.connection(ctx)?.info().await?)
    }

    async fn wipe(&self, ctx: &IndexContext) -> IndexResult<()> {
        let manager = self.connection_manager(ctx)?;
        manager.set_changed(&ctx.transaction)?;
        manager.connection()?.clear().await?;
        Ok(())
    }

    /// Geometry and box stored for a document, or `None` when the service
    /// cannot be asked
    pub async fn entry_for_object(
        &self,
        ctx: &IndexContext,
        document_id: DocumentId,
    ) -> IndexResult<Option<Vec<IndexEntry>>> {
        let entries = self.stored_records(ctx, document_id).await.map(|records| {
            Some(
                records
                    .into_iter()
                    .map(|r| IndexEntry {
                        geometry: Some(r.geometry),
                        bbox: Some(r.bbox),
                    })
                    .collect(),
            )
        });
        self.degrade(entries, None, "read entry")
    }

    /// Unscored service hits for the part of `request` addressed to this
    /// index, with their stored properties
    pub async fn apply_index_raw(
        &self,
        ctx: &IndexContext,
        request: &IndexRequest,
    ) -> IndexResult<Option<Vec<ScoredItem>>> {
        let id = self.id();
        let spec = match request.resolve(&id) {
            None => return Ok(None),
            Some(Ok(spec)) => spec,
            Some(Err(e)) => {
                tracing::warn!("{} ignoring malformed query: {}", id, e);
                return Ok(None);
            }
        };

        tracing::debug!("{} querying {:?}", id, spec);
        let hits = self.run_query(ctx, &spec).await.map(Some);
        self.degrade(hits, None, "query")
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("config", &self.config.read().ok())
            .field("oid", &self.oid)
            .finish()
    }
}

#[async_trait]
impl PluggableIndex for SpatialIndex {
    fn id(&self) -> String {
        self.config.read().map(|c| c.id.clone()).unwrap_or_default()
    }

    async fn index_object(
        &self,
        ctx: &IndexContext,
        document_id: DocumentId,
        obj: &dyn Indexable,
    ) -> IndexResult<bool> {
        let record = match self.build_record(document_id, obj) {
            Ok(record) => record,
            Err(IndexError::NotIndexable(path)) => {
                tracing::info!("No indexable attribute {} in {}", self.id(), path);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        tracing::info!("Indexing {}: {} ({})", self.id(), document_id, record.properties.path);
        let sent = self
            .write(ctx, BatchRequest::index(record))
            .await
            .map(|_| true);
        self.degrade(sent, false, &format!("index document {}", document_id))
    }

    async fn unindex_object(&self, ctx: &IndexContext, document_id: DocumentId) -> IndexResult<bool> {
        tracing::debug!("Unindexing {}: {}", self.id(), document_id);
        let records = match self.stored_records(ctx, document_id).await {
            Ok(records) => records,
            Err(e) if e.is_service() => {
                tracing::warn!("{} failed to look up document {}: {}", self.id(), document_id, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if records.is_empty() {
            tracing::info!("Document {} is not in {}", document_id, self.id());
            return Ok(false);
        }

        let sent = self
            .write(ctx, BatchRequest::Unindex(records))
            .await
            .map(|_| true);
        self.degrade(sent, false, &format!("unindex document {}", document_id))
    }

    async fn apply_index(
        &self,
        ctx: &IndexContext,
        request: &IndexRequest,
    ) -> IndexResult<Option<AppliedIndex>> {
        let Some(hits) = self.apply_index_raw(ctx, request).await? else {
            return Ok(None);
        };

        let mut scores = BTreeMap::new();
        for hit in &hits {
            match hit.document_id() {
                Some(id) => {
                    scores.insert(id, hit.int_score());
                }
                None => tracing::warn!("{} skipping hit with id {:?}", self.id(), hit.id),
            }
        }

        Ok(Some(AppliedIndex {
            results: ResultSet::Scored(scores),
            fields: vec![self.id()],
        }))
    }

    async fn index_size(&self, ctx: &IndexContext) -> IndexResult<u64> {
        let size = self.stats(ctx).await.map(|s| s.num_items);
        self.degrade(size, 0, "read service info")
    }

    async fn clear(&self, ctx: &IndexContext) -> IndexResult<bool> {
        tracing::info!("Clearing {}", self.id());
        let cleared = self.wipe(ctx).await.map(|_| true);
        self.degrade(cleared, false, "clear")
    }
}
