use std::fmt;
use std::path::Path;
use std::str::FromStr;

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collect::response::FeatureRecord;
use crate::error::{QueryError, QueryResult};

/// How a feature sequence is rendered into the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The feature array exactly as received.
    #[default]
    Json,
    /// One row per feature, columns from the first feature's attributes.
    Csv,
    /// A GeoJSON FeatureCollection.
    GeoJson,
}

impl OutputFormat {
    /// Infer from the file extension. Unknown extensions fall back to JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.parse().unwrap_or_else(|_| {
                log::warn!(
                    "Invalid file type {:?} given. Saving {:?} as json instead.",
                    ext,
                    path
                );
                OutputFormat::Json
            }),
            None => OutputFormat::Json,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::GeoJson => "geojson",
        }
    }

    /// Render the whole sequence in memory.
    pub fn render(&self, features: &[FeatureRecord]) -> QueryResult<Vec<u8>> {
        match self {
            OutputFormat::Json => render_json(features),
            OutputFormat::Csv => render_csv(features),
            OutputFormat::GeoJson => render_geojson(features),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "pjson" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "geojson" => Ok(OutputFormat::GeoJson),
            other => Err(QueryError::invalid(format!("unknown output format {other:?}"))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

pub fn render_json(features: &[FeatureRecord]) -> QueryResult<Vec<u8>> {
    serde_json::to_vec(features).map_err(|e| QueryError::Output(e.to_string()))
}

/// Attribute map of a record, or the record itself when it has none.
fn row_of(feature: &FeatureRecord) -> Option<&serde_json::Map<String, Value>> {
    match feature.get("attributes") {
        Some(Value::Object(attributes)) => Some(attributes),
        _ => feature.as_object(),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn render_csv(features: &[FeatureRecord]) -> QueryResult<Vec<u8>> {
    let Some(first) = features.first() else {
        return Ok(Vec::new());
    };
    let header: Vec<&String> = row_of(first)
        .ok_or_else(|| QueryError::Output("first feature is not an object".to_string()))?
        .keys()
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    let to_output = |e: csv::Error| QueryError::Output(e.to_string());

    writer.write_record(&header).map_err(to_output)?;
    for feature in features {
        let row = row_of(feature);
        let record: Vec<String> = header
            .iter()
            .map(|key| cell(row.and_then(|r| r.get(key.as_str()))))
            .collect();
        writer.write_record(&record).map_err(to_output)?;
    }

    writer
        .into_inner()
        .map_err(|e| QueryError::Output(e.to_string()))
}

fn coords(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn coords_list(value: &Value) -> Option<Vec<Vec<f64>>> {
    value.as_array()?.iter().map(coords).collect()
}

fn coords_lists(value: &Value) -> Option<Vec<Vec<Vec<f64>>>> {
    value.as_array()?.iter().map(coords_list).collect()
}

/// Map an esri JSON geometry to GeoJSON. Unknown shapes map to `None`.
pub fn esri_to_geojson_geometry(geometry: &Value) -> Option<Geometry> {
    let value = if let (Some(x), Some(y)) = (
        geometry.get("x").and_then(Value::as_f64),
        geometry.get("y").and_then(Value::as_f64),
    ) {
        geojson::Value::Point(vec![x, y])
    } else if let Some(points) = geometry.get("points") {
        geojson::Value::MultiPoint(coords_list(points)?)
    } else if let Some(paths) = geometry.get("paths") {
        let mut paths = coords_lists(paths)?;
        if paths.len() == 1 {
            geojson::Value::LineString(paths.remove(0))
        } else {
            geojson::Value::MultiLineString(paths)
        }
    } else if let Some(rings) = geometry.get("rings") {
        geojson::Value::Polygon(coords_lists(rings)?)
    } else {
        return None;
    };
    Some(Geometry::new(value))
}

pub fn render_geojson(features: &[FeatureRecord]) -> QueryResult<Vec<u8>> {
    let features = features
        .iter()
        .map(|record| {
            let properties: Option<JsonObject> = row_of(record).cloned();
            Feature {
                bbox: None,
                geometry: record.get("geometry").and_then(esri_to_geojson_geometry),
                id: None,
                properties,
                foreign_members: None,
            }
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    Ok(GeoJson::from(collection).to_string().into_bytes())
}
