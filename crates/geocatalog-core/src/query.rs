//! Query grammar: generic catalog requests and resolved spatial queries

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geometry::{Bbox, Point};

/// Spatial predicate understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// Stored boxes intersecting the query box
    #[default]
    Intersection,
    /// Stored boxes within the query box
    Within,
    /// Geometries within a radius of a point
    Distance,
    /// The nearest geometries to a point
    Nearest,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intersection => "intersection",
            Self::Within => "within",
            Self::Distance => "distance",
            Self::Nearest => "nearest",
        }
    }

    pub fn all() -> &'static [Predicate] {
        &[
            Self::Intersection,
            Self::Within,
            Self::Distance,
            Self::Nearest,
        ]
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "intersection" => Ok(Self::Intersection),
            "within" => Ok(Self::Within),
            "distance" => Ok(Self::Distance),
            "nearest" => Ok(Self::Nearest),
            other => Err(Error::UnknownPredicate(other.to_string())),
        }
    }
}

/// A resolved spatial query, consumed once by the client
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySpec {
    Intersection(Bbox),
    Within(Bbox),
    /// Radius is already in the service's distance unit
    Distance { point: Point, radius: f64 },
    /// Point queries are sent as a degenerate box
    Nearest { bbox: Bbox, limit: usize },
}

impl QuerySpec {
    pub fn intersection(bbox: Bbox) -> Self {
        Self::Intersection(bbox)
    }

    pub fn distance(point: Point, radius: f64) -> Self {
        Self::Distance { point, radius }
    }

    pub fn nearest(point: Point, limit: usize) -> Self {
        Self::Nearest {
            bbox: Bbox::from_point(point),
            limit,
        }
    }

    pub fn predicate(&self) -> Predicate {
        match self {
            Self::Intersection(_) => Predicate::Intersection,
            Self::Within(_) => Predicate::Within,
            Self::Distance { .. } => Predicate::Distance,
            Self::Nearest { .. } => Predicate::Nearest,
        }
    }

    /// Query-string parameters, excluding pagination
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Intersection(bbox) | Self::Within(bbox) => vec![("bbox", bbox.to_param())],
            Self::Distance { point, radius } => vec![
                ("lon", point.lon().to_string()),
                ("lat", point.lat().to_string()),
                ("radius", radius.to_string()),
            ],
            Self::Nearest { bbox, limit } => {
                vec![("bbox", bbox.to_param()), ("limit", limit.to_string())]
            }
        }
    }
}

/// Operands of a field query: bare coordinates, or coordinates with a scalar
/// (radius for `distance`, limit for `nearest`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operands {
    Coords(Vec<f64>),
    WithScalar(Vec<f64>, f64),
}

impl Operands {
    fn coords(&self) -> &[f64] {
        match self {
            Self::Coords(c) | Self::WithScalar(c, _) => c,
        }
    }

    fn scalar(&self) -> Option<f64> {
        match self {
            Self::Coords(_) => None,
            Self::WithScalar(_, s) => Some(*s),
        }
    }
}

/// The part of a catalog request addressed to one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub query: Operands,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl FieldQuery {
    pub fn new(query: Operands, predicate: Predicate) -> Self {
        Self {
            query,
            range: Some(predicate.as_str().to_string()),
        }
    }

    pub fn bbox(bbox: Bbox) -> Self {
        Self::new(Operands::Coords(<[f64; 4]>::from(bbox).to_vec()), Predicate::Intersection)
    }

    /// Resolve into a [`QuerySpec`]. An absent range means intersection.
    pub fn resolve(&self) -> Result<QuerySpec> {
        let predicate = match self.range.as_deref() {
            None | Some("") => Predicate::Intersection,
            Some(range) => range.parse()?,
        };
        let coords = self.query.coords();

        match predicate {
            Predicate::Intersection => Ok(QuerySpec::Intersection(Bbox::from_coords(coords)?)),
            Predicate::Within => Ok(QuerySpec::Within(Bbox::from_coords(coords)?)),
            Predicate::Distance => {
                let point = point_from(coords)?;
                let radius = self.query.scalar().ok_or_else(|| {
                    Error::InvalidQuery("distance queries need a radius".to_string())
                })?;
                if !radius.is_finite() || radius < 0.0 {
                    return Err(Error::InvalidQuery(format!("invalid radius {}", radius)));
                }
                Ok(QuerySpec::distance(point, radius))
            }
            Predicate::Nearest => {
                let limit = self.query.scalar().ok_or_else(|| {
                    Error::InvalidQuery("nearest queries need a limit".to_string())
                })?;
                if !limit.is_finite() || limit < 1.0 || limit.fract() != 0.0 {
                    return Err(Error::InvalidQuery(format!("invalid limit {}", limit)));
                }
                let bbox = match coords.len() {
                    2 => Bbox::from_point(point_from(coords)?),
                    _ => Bbox::from_coords(coords)?,
                };
                Ok(QuerySpec::Nearest {
                    bbox,
                    limit: limit as usize,
                })
            }
        }
    }
}

fn point_from(coords: &[f64]) -> Result<Point> {
    match coords {
        [x, y] => Ok(Point::new(*x, *y)),
        _ => Err(Error::InvalidQuery(format!(
            "a point needs 2 coordinates, got {}",
            coords.len()
        ))),
    }
}

/// A generic catalog request: field name to field query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexRequest {
    fields: HashMap<String, FieldQuery>,
}

impl IndexRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, query: FieldQuery) -> Self {
        self.fields.insert(field.into(), query);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, query: FieldQuery) {
        self.fields.insert(field.into(), query);
    }

    pub fn get(&self, field: &str) -> Option<&FieldQuery> {
        self.fields.get(field)
    }

    /// `None` when the request has nothing for `field`
    pub fn resolve(&self, field: &str) -> Option<Result<QuerySpec>> {
        self.get(field).map(FieldQuery::resolve)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
