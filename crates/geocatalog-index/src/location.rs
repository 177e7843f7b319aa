//! Location query index: spatial hits plus their containers

use async_trait::async_trait;
use geocatalog_core::{parent_path, DocumentId, IndexRequest, Indexable, LocationIndexConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use crate::error::{IndexError, IndexResult};
use crate::traits::{AppliedIndex, Catalog, IndexContext, PluggableIndex, ResultSet};

/// Read-only index answering spatial queries with the matching documents
/// and the documents that contain them.
///
/// Nothing is indexed here. Queries are forwarded to a sibling spatial
/// index, filtered by what the principal may see, and extended with the
/// record ids of each hit's parent.
pub struct LocationQueryIndex {
    config: LocationIndexConfig,
    catalog: Weak<dyn Catalog>,
}

impl LocationQueryIndex {
    pub fn new(config: LocationIndexConfig, catalog: Weak<dyn Catalog>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &LocationIndexConfig {
        &self.config
    }

    fn catalog(&self) -> IndexResult<Arc<dyn Catalog>> {
        self.catalog
            .upgrade()
            .ok_or_else(|| IndexError::Catalog("catalog is gone".to_string()))
    }
}

#[async_trait]
impl PluggableIndex for LocationQueryIndex {
    fn id(&self) -> String {
        self.config.id.clone()
    }

    async fn index_object(
        &self,
        _ctx: &IndexContext,
        _document_id: DocumentId,
        _obj: &dyn Indexable,
    ) -> IndexResult<bool> {
        Ok(true)
    }

    async fn unindex_object(&self, _ctx: &IndexContext, _document_id: DocumentId) -> IndexResult<bool> {
        Ok(true)
    }

    async fn apply_index(
        &self,
        ctx: &IndexContext,
        request: &IndexRequest,
    ) -> IndexResult<Option<AppliedIndex>> {
        let Some(field) = request.get(&self.config.id) else {
            return Ok(None);
        };

        let catalog = self.catalog()?;
        let geo_index = catalog
            .spatial_index(&self.config.geoindex_id)
            .ok_or_else(|| IndexError::UnknownIndex(self.config.geoindex_id.clone()))?;

        let geo_request = IndexRequest::new().with_field(&self.config.geoindex_id, field.clone());
        let Some(hits) = geo_index.apply_index_raw(ctx, &geo_request).await? else {
            return Ok(None);
        };

        let mut paths: BTreeMap<DocumentId, String> = BTreeMap::new();
        for hit in hits {
            if let Some(id) = hit.document_id() {
                paths.insert(id, hit.properties.path);
            }
        }

        let allowed = ctx.principal.allowed_roles_and_users();
        let permitted = catalog.permitted_documents(&allowed).await?;

        let visible: BTreeSet<DocumentId> = paths
            .keys()
            .copied()
            .filter(|id| permitted.contains(id))
            .collect();

        let root = catalog.site_root();
        let mut results = visible.clone();
        for id in &visible {
            let parent = parent_path(&root, &paths[id]);
            match catalog.record_id(&parent) {
                Some(rid) => {
                    results.insert(rid);
                }
                None => tracing::debug!("{} has no catalog record for {}", self.id(), parent),
            }
        }

        tracing::debug!(
            "{}: {} spatial hits, {} visible, {} with containers",
            self.id(),
            paths.len(),
            visible.len(),
            results.len()
        );

        Ok(Some(AppliedIndex {
            results: ResultSet::Ids(results),
            fields: vec![self.id()],
        }))
    }

    async fn index_size(&self, _ctx: &IndexContext) -> IndexResult<u64> {
        Ok(0)
    }

    async fn clear(&self, _ctx: &IndexContext) -> IndexResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::SpatialIndex;
    use crate::transaction::Transaction;
    use geocatalog_client::{ClientResult, ConnectionSettings, MemorySpatialService, SpatialService};
    use geocatalog_core::{
        BatchRequest, Bbox, FieldQuery, Geometry, IndexConfig, IndexRecord, Operands, Point,
        Predicate, Principal, RecordProperties,
    };
    use std::collections::HashMap;

    struct TestCatalog {
        geo: Arc<SpatialIndex>,
        permissions: HashMap<String, BTreeSet<DocumentId>>,
        rids: HashMap<String, DocumentId>,
        permissions_broken: bool,
    }

    #[async_trait]
    impl Catalog for TestCatalog {
        fn spatial_index(&self, id: &str) -> Option<Arc<SpatialIndex>> {
            (id == "geolocation").then(|| self.geo.clone())
        }

        async fn permitted_documents(&self, allowed: &[String]) -> IndexResult<BTreeSet<DocumentId>> {
            if self.permissions_broken {
                return Err(IndexError::Catalog("permission index missing".to_string()));
            }
            Ok(allowed
                .iter()
                .filter_map(|token| self.permissions.get(token))
                .flatten()
                .copied()
                .collect())
        }

        fn record_id(&self, path: &str) -> Option<DocumentId> {
            self.rids.get(path).copied()
        }

        fn site_root(&self) -> String {
            "/plone".to_string()
        }
    }

    async fn seeded_service() -> Arc<MemorySpatialService> {
        let service = Arc::new(MemorySpatialService::new());
        for (id, path, x) in [(1, "a/b/x", 1.0), (2, "a/b/z", 2.0), (3, "a/c/y", 3.0)] {
            let p = Point::new(x, 1.0);
            let record = IndexRecord::new(id, Geometry::point(p), Bbox::from_point(p)).with_properties(
                RecordProperties {
                    path: path.to_string(),
                    ..Default::default()
                },
            );
            service.batch(&BatchRequest::index(record)).await.unwrap();
        }
        service
    }

    fn catalog_over(service: Arc<MemorySpatialService>) -> Arc<TestCatalog> {
        let geo = SpatialIndex::new(IndexConfig::new("geolocation").with_uri("memory://geo"))
            .with_factory(Arc::new(
                move |_: &ConnectionSettings| -> ClientResult<Arc<dyn SpatialService>> {
                    Ok(service.clone())
                },
            ));
        Arc::new(TestCatalog {
            geo: Arc::new(geo),
            permissions: HashMap::from([
                ("Anonymous".to_string(), BTreeSet::from([1])),
                ("user:sean".to_string(), BTreeSet::from([3])),
            ]),
            rids: HashMap::from([
                ("/plone/a/b".to_string(), 100),
                ("/plone/a/c".to_string(), 200),
            ]),
            permissions_broken: false,
        })
    }

    fn location_index(catalog: &Arc<TestCatalog>) -> LocationQueryIndex {
        let catalog: Arc<dyn Catalog> = catalog.clone();
        LocationQueryIndex::new(
            LocationIndexConfig::new("location", "geolocation"),
            Arc::downgrade(&catalog),
        )
    }

    fn request() -> IndexRequest {
        IndexRequest::new().with_field("location", FieldQuery::bbox(Bbox::new(0.0, 0.0, 10.0, 10.0)))
    }

    #[tokio::test]
    async fn test_hits_and_containers() {
        let catalog = catalog_over(seeded_service().await);
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin()).with_principal(Principal::user("sean"));

        let applied = index.apply_index(&ctx, &request()).await.unwrap().unwrap();
        assert_eq!(applied.fields, vec!["location".to_string()]);
        assert_eq!(applied.results, ResultSet::Ids(BTreeSet::from([1, 3, 100, 200])));
    }

    #[tokio::test]
    async fn test_permissions_filter_hits() {
        let catalog = catalog_over(seeded_service().await);
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin());

        let applied = index.apply_index(&ctx, &request()).await.unwrap().unwrap();
        assert_eq!(applied.results, ResultSet::Ids(BTreeSet::from([1, 100])));
    }

    #[tokio::test]
    async fn test_unrelated_request() {
        let catalog = catalog_over(seeded_service().await);
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin());

        let other = IndexRequest::new().with_field("geolocation", FieldQuery::bbox(Bbox::new(0.0, 0.0, 1.0, 1.0)));
        assert!(index.apply_index(&ctx, &other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_sibling_index() {
        let catalog = catalog_over(seeded_service().await);
        let catalog_dyn: Arc<dyn Catalog> = catalog.clone();
        let index = LocationQueryIndex::new(
            LocationIndexConfig::new("location", "missing"),
            Arc::downgrade(&catalog_dyn),
        );
        let ctx = IndexContext::new(Transaction::begin());

        let err = index.apply_index(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, IndexError::UnknownIndex(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_permission_failure_propagates() {
        let mut catalog = catalog_over(seeded_service().await);
        Arc::get_mut(&mut catalog).unwrap().permissions_broken = true;
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin());

        let err = index.apply_index(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, IndexError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_spatial_outage_contributes_nothing() {
        let service = seeded_service().await;
        let catalog = catalog_over(service.clone());
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin());

        service.set_unreachable(true);
        assert!(index.apply_index(&ctx, &request()).await.unwrap().is_none());

        let malformed = IndexRequest::new().with_field(
            "location",
            FieldQuery::new(Operands::Coords(vec![1.0, 2.0, 3.0]), Predicate::Intersection),
        );
        service.set_unreachable(false);
        assert!(index.apply_index(&ctx, &malformed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writes_are_noops() {
        let catalog = catalog_over(seeded_service().await);
        let index = location_index(&catalog);
        let ctx = IndexContext::new(Transaction::begin());

        let doc = geocatalog_core::GeoDocument::new("/plone/a/b/x");
        assert!(index.index_object(&ctx, 1, &doc).await.unwrap());
        assert!(index.unindex_object(&ctx, 1).await.unwrap());
        assert_eq!(index.index_size(&ctx).await.unwrap(), 0);
        assert_eq!(index.num_objects().await, 0);
        assert_eq!(index.index_source_names(), vec!["location".to_string()]);
    }
}
