//! In-memory spatial service

use crate::error::{ClientError, ClientResult};
use crate::traits::SpatialService;
use async_trait::async_trait;
use geocatalog_core::{
    BatchRequest, Bbox, DocumentId, IndexRecord, Point, QuerySpec, ScoredItem, ServiceStats,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// In-memory spatial service
///
/// Useful for testing. Boxes are compared directly; distances are great-circle
/// distances in meters between box centers.
pub struct MemorySpatialService {
    uri: String,
    records: RwLock<BTreeMap<String, IndexRecord>>,
    unreachable: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySpatialService {
    pub fn new() -> Self {
        Self::with_uri("memory://")
    }

    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            records: RwLock::new(BTreeMap::new()),
            unreachable: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Make every call fail as if the service were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of accepted write requests
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reachable(&self) -> ClientResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Unreachable(format!(
                "{} is not reachable",
                self.uri
            )));
        }
        Ok(())
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> ClientError {
        ClientError::Http {
            status: 500,
            body: format!("Lock error: {}", e),
        }
    }

    fn scored(record: &IndexRecord, score: f64) -> ScoredItem {
        ScoredItem {
            id: record.id.clone(),
            score,
            bbox: Some(record.bbox),
            geometry: Some(record.geometry.clone()),
            properties: record.properties.clone(),
        }
    }
}

impl Default for MemorySpatialService {
    fn default() -> Self {
        Self::new()
    }
}

/// Great-circle distance in meters
fn haversine(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.lat().to_radians(), b.lat().to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon() - a.lon()).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

#[async_trait]
impl SpatialService for MemorySpatialService {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn info(&self) -> ClientResult<ServiceStats> {
        self.check_reachable()?;
        Ok(ServiceStats {
            num_items: self.len() as u64,
            extra: Default::default(),
        })
    }

    async fn items(&self, document_id: DocumentId) -> ClientResult<Vec<IndexRecord>> {
        self.check_reachable()?;
        let records = self.records.read().map_err(Self::lock_error)?;
        Ok(records
            .get(&document_id.to_string())
            .cloned()
            .into_iter()
            .collect())
    }

    async fn query(&self, spec: &QuerySpec) -> ClientResult<Vec<ScoredItem>> {
        self.check_reachable()?;
        let records = self.records.read().map_err(Self::lock_error)?;

        let hits = match spec {
            QuerySpec::Intersection(bbox) => records
                .values()
                .filter(|r| r.bbox.intersects(bbox))
                .map(|r| Self::scored(r, 1.0))
                .collect(),
            QuerySpec::Within(bbox) => records
                .values()
                .filter(|r| bbox.contains(&r.bbox))
                .map(|r| Self::scored(r, 1.0))
                .collect(),
            QuerySpec::Distance { point, radius } => records
                .values()
                .filter_map(|r| {
                    let d = haversine(*point, r.bbox.center());
                    if d > *radius {
                        return None;
                    }
                    let score = if *radius > 0.0 { 1.0 - d / radius } else { 1.0 };
                    Some(Self::scored(r, score.max(0.001)))
                })
                .collect(),
            QuerySpec::Nearest { bbox, limit } => {
                let origin: Bbox = *bbox;
                let mut by_distance: Vec<(f64, &IndexRecord)> = records
                    .values()
                    .map(|r| (haversine(origin.center(), r.bbox.center()), r))
                    .collect();
                by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
                by_distance
                    .into_iter()
                    .take(*limit)
                    .map(|(d, r)| Self::scored(r, 1.0 / (1.0 + d / 1000.0)))
                    .collect()
            }
        };

        Ok(hits)
    }

    async fn batch(&self, request: &BatchRequest) -> ClientResult<()> {
        self.check_reachable()?;
        let mut records = self.records.write().map_err(Self::lock_error)?;
        match request {
            BatchRequest::Index(batch) => {
                for record in batch {
                    records.insert(record.id.clone(), record.clone());
                }
            }
            BatchRequest::Unindex(batch) => {
                for record in batch {
                    records.remove(&record.id);
                }
            }
            BatchRequest::Clear(true) => records.clear(),
            BatchRequest::Clear(false) => {}
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
