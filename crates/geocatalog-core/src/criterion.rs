//! Search criterion parameters as entered in a saved search or on the command line

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::{FieldQuery, Operands, Predicate};

/// A spatial search criterion.
///
/// Corners are `"lon,lat"` strings. The upper-right corner is optional and
/// turns the lower-left point into a search box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionParameters {
    pub lower_left: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_right: Option<String>,

    #[serde(default)]
    pub predicate: Predicate,

    /// Radius for the distance predicate, in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,

    /// Result cap for the nearest predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl CriterionParameters {
    pub fn new(lower_left: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            lower_left: lower_left.into(),
            upper_right: None,
            predicate,
            tolerance: None,
            limit: None,
        }
    }

    pub fn with_upper_right(mut self, upper_right: impl Into<String>) -> Self {
        self.upper_right = Some(upper_right.into());
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Coordinates of the lower-left corner, followed by the upper-right one
    pub fn value(&self) -> Result<Vec<f64>> {
        let mut coords = parse_point(&self.lower_left)?.to_vec();
        if let Some(ur) = self.upper_right.as_deref().filter(|s| !s.trim().is_empty()) {
            coords.extend(parse_point(ur)?);
        }
        Ok(coords)
    }

    /// The `(field, query)` pair this criterion contributes to a catalog request
    pub fn criteria_item(&self, field: &str) -> Result<(String, FieldQuery)> {
        let coords = self.value()?;
        let operands = match self.predicate {
            Predicate::Intersection | Predicate::Within => Operands::Coords(coords),
            Predicate::Distance => {
                let tolerance = self.tolerance.ok_or_else(|| {
                    Error::InvalidQuery("distance criterion needs a tolerance".to_string())
                })?;
                Operands::WithScalar(coords, tolerance)
            }
            Predicate::Nearest => {
                let limit = self.limit.ok_or_else(|| {
                    Error::InvalidQuery("nearest criterion needs a limit".to_string())
                })?;
                Operands::WithScalar(coords, limit as f64)
            }
        };
        Ok((field.to_string(), FieldQuery::new(operands, self.predicate)))
    }
}

/// Parse a `"x,y"` pair of decimal numbers
pub fn parse_point(s: &str) -> Result<[f64; 2]> {
    let invalid = || Error::InvalidPoint(s.to_string());
    let (x, y) = s.split_once(',').ok_or_else(invalid)?;
    let parse = |part: &str| -> Result<f64> {
        let part = part.trim();
        if part.is_empty() || part.contains(char::is_whitespace) {
            return Err(invalid());
        }
        part.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(invalid)
    };
    Ok([parse(x)?, parse(y)?])
}
