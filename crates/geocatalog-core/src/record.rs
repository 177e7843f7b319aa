//! Records exchanged with the spatial service

use serde::{Deserialize, Deserializer, Serialize};

use crate::geometry::{Bbox, Geometry};

/// Host-assigned integer document id
pub type DocumentId = u64;

/// Descriptive properties stored alongside each geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordProperties {
    /// Path of the document relative to the site root
    #[serde(default)]
    pub path: String,

    /// Id of the containing document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,
}

/// One stored item: what `index` sends and what `items` returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub bbox: Bbox,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: RecordProperties,
}

impl IndexRecord {
    pub fn new(document_id: DocumentId, geometry: Geometry, bbox: Bbox) -> Self {
        Self {
            id: document_id.to_string(),
            bbox,
            geometry,
            properties: RecordProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: RecordProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Geometry and box of a stored item, without its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub geometry: Option<Geometry>,
    pub bbox: Option<Bbox>,
}

/// A query hit as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default)]
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Bbox>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,

    #[serde(default)]
    pub properties: RecordProperties,
}

impl ScoredItem {
    /// Integer document id, if the service id is numeric
    pub fn document_id(&self) -> Option<DocumentId> {
        self.id.trim().parse().ok()
    }

    /// Relevance scaled by 1000 and truncated
    pub fn int_score(&self) -> u32 {
        scale_score(self.score)
    }
}

// The service echoes ids back as strings, older deployments as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Scale a floating relevance score into the catalog's integer score
pub fn scale_score(score: f64) -> u32 {
    if !score.is_finite() || score <= 0.0 {
        return 0;
    }
    (score * 1000.0).floor() as u32
}

/// Service introspection (`GET {base}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub num_items: u64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of `GET {base}/items/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<IndexRecord>,
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Total hits available across all pages
    pub hits: usize,

    /// Items in this page
    pub count: usize,

    #[serde(default)]
    pub items: Vec<ScoredItem>,
}

/// Body of a write `POST {base}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchRequest {
    Index(Vec<IndexRecord>),
    Unindex(Vec<IndexRecord>),
    Clear(bool),
}

impl BatchRequest {
    pub fn index(record: IndexRecord) -> Self {
        Self::Index(vec![record])
    }

    pub fn unindex(record: IndexRecord) -> Self {
        Self::Unindex(vec![record])
    }

    pub fn clear() -> Self {
        Self::Clear(true)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Index(records) | Self::Unindex(records) => records.len(),
            Self::Clear(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
