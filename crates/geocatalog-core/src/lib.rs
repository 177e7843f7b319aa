//! Geocatalog Core - Shared types for the spatial index connector
//!
//! This crate provides the geometry, record, query and configuration types
//! used by the spatial service client and the catalog indexes.

pub mod config;
pub mod criterion;
pub mod document;
pub mod error;
pub mod geometry;
pub mod query;
pub mod record;

pub use config::{
    ConfigUpdate, IndexConfig, LocationIndexConfig, DEFAULT_MAX_PAGES, DEFAULT_TIMEOUT_SECS,
};
pub use criterion::{parse_point, CriterionParameters};
pub use document::{parent_path, relative_path, GeoDocument, Indexable, Principal};
pub use error::{Error, Result};
pub use geometry::{Bbox, Feature, Geometry, HasGeometry, Point};
pub use query::{FieldQuery, IndexRequest, Operands, Predicate, QuerySpec};
pub use record::{
    scale_score, BatchRequest, DocumentId, IndexEntry, IndexRecord, ItemsResponse, QueryPage,
    RecordProperties, ScoredItem, ServiceStats,
};
