//! Geometry types shared by the index and the spatial service protocol

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A longitude/latitude (or x/y) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn lon(&self) -> f64 {
        self.x
    }

    pub fn lat(&self) -> f64 {
        self.y
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned bounding box, serialized as `[minx, miny, maxx, maxy]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box covering a single point
    pub fn from_point(point: Point) -> Self {
        Self::new(point.x, point.y, point.x, point.y)
    }

    /// Build a box from exactly four coordinates
    pub fn from_coords(coords: &[f64]) -> Result<Self> {
        match coords {
            [a, b, c, d] => Ok(Self::new(*a, *b, *c, *d)),
            _ => Err(Error::InvalidQuery(format!(
                "a bounding box needs 4 coordinates, got {}",
                coords.len()
            ))),
        }
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, other: &Bbox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Grow the box so it covers `point`
    pub fn extend(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_x = self.max_x.max(point.x);
        self.max_y = self.max_y.max(point.y);
    }

    /// Comma-joined form used in query strings
    pub fn to_param(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl From<[f64; 4]> for Bbox {
    fn from([a, b, c, d]: [f64; 4]) -> Self {
        Self::new(a, b, c, d)
    }
}

impl From<Bbox> for [f64; 4] {
    fn from(b: Bbox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

/// GeoJSON-like geometry: a type name and a nested coordinate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: serde_json::Value,
}

impl Geometry {
    pub fn new(kind: impl Into<String>, coordinates: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            coordinates,
        }
    }

    pub fn point(point: Point) -> Self {
        Self::new("Point", serde_json::json!([point.x, point.y]))
    }

    /// Bounding box of every position in the coordinate tree.
    ///
    /// Returns `None` when the tree holds no numeric position.
    pub fn compute_bounds(&self) -> Option<Bbox> {
        let mut bounds: Option<Bbox> = None;
        collect_positions(&self.coordinates, &mut |p| match bounds.as_mut() {
            Some(b) => b.extend(p),
            None => bounds = Some(Bbox::from_point(p)),
        });
        bounds
    }
}

fn collect_positions(value: &serde_json::Value, visit: &mut dyn FnMut(Point)) {
    let Some(items) = value.as_array() else {
        return;
    };
    let numbers: Vec<f64> = items.iter().filter_map(|v| v.as_f64()).collect();
    if numbers.len() >= 2 && numbers.len() == items.len() {
        visit(Point::new(numbers[0], numbers[1]));
        return;
    }
    for item in items {
        collect_positions(item, visit);
    }
}

/// Capability of anything that can be placed in the spatial index
pub trait HasGeometry {
    /// Bounding box of the geometry
    fn bounds(&self) -> Bbox;

    /// Geometry type and coordinates
    fn geometry(&self) -> Geometry;
}

/// A geometry together with its (possibly precomputed) bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Geometry,
    pub bbox: Bbox,
}

impl Feature {
    /// Build a feature, computing the box from the coordinates
    pub fn new(geometry: Geometry) -> Option<Self> {
        let bbox = geometry.compute_bounds()?;
        Some(Self { geometry, bbox })
    }

    pub fn with_bbox(geometry: Geometry, bbox: Bbox) -> Self {
        Self { geometry, bbox }
    }
}

impl HasGeometry for Feature {
    fn bounds(&self) -> Bbox {
        self.bbox
    }

    fn geometry(&self) -> Geometry {
        self.geometry.clone()
    }
}
