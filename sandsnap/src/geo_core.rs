use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{QueryError, QueryResult};

/// Esri geometry type declared for every query, used or not.
pub const ENVELOPE_GEOMETRY_TYPE: &str = "esriGeometryEnvelope";

/// Rectangular spatial filter in the service's spatial reference.
///
/// Serialized as `[xmin, ymin, xmax, ymax]` so job files stay short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64, // xmin (longitude)
    pub min_y: f64, // ymin (latitude)
    pub max_x: f64, // xmax
    pub max_y: f64, // ymax
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build from `[xmin, ymin, xmax, ymax]`, checking arity and ordering.
    pub fn from_slice(bounds: &[f64]) -> QueryResult<Self> {
        match bounds {
            [min_x, min_y, max_x, max_y] => {
                let bbox = BoundingBox::new(*min_x, *min_y, *max_x, *max_y);
                bbox.validate()?;
                Ok(bbox)
            }
            _ => Err(QueryError::invalid(format!(
                "geometry needs exactly 4 bounds [xmin, ymin, xmax, ymax], got {}",
                bounds.len()
            ))),
        }
    }

    /// Bounds must be finite with `xmin <= xmax` and `ymin <= ymax`.
    pub fn validate(&self) -> QueryResult<()> {
        if !self.as_array().iter().all(|v| v.is_finite()) {
            return Err(QueryError::invalid(format!(
                "geometry bounds must be finite: {:?}",
                self.as_array()
            )));
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(QueryError::invalid(format!(
                "geometry bounds are inverted: {:?}",
                self.as_array()
            )));
        }
        Ok(())
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Esri envelope JSON, e.g. `{"xmin":-91.0,"ymin":32.0,"xmax":-90.0,"ymax":33.0}`.
    pub fn to_envelope_json(&self) -> String {
        json!({
            "xmin": self.min_x,
            "ymin": self.min_y,
            "xmax": self.max_x,
            "ymax": self.max_y,
        })
        .to_string()
    }
}

impl TryFrom<Vec<f64>> for BoundingBox {
    type Error = QueryError;

    fn try_from(bounds: Vec<f64>) -> QueryResult<Self> {
        BoundingBox::from_slice(&bounds)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.as_array()
    }
}
