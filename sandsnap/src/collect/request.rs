use serde_json::{json, Value};
use url::Url;

use crate::error::{QueryError, QueryResult};
use crate::geo_core::{BoundingBox, ENVELOPE_GEOMETRY_TYPE};

/// Layer every filter is attached to in `layerDefs`.
pub const QUERY_LAYER: &str = "0";

/// One filtered query against a feature service.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    base_url: Url,
    filter_expression: String,
    geometry: Option<BoundingBox>,
}

impl QueryRequest {
    /// Validate and build a request. Nothing touches the network here.
    pub fn new(
        base_url: &str,
        filter_expression: &str,
        geometry: Option<BoundingBox>,
    ) -> QueryResult<Self> {
        let base_url = parse_base_url(base_url)?;
        if filter_expression.trim().is_empty() {
            return Err(QueryError::invalid("filter expression must not be empty"));
        }
        if let Some(bbox) = &geometry {
            bbox.validate()?;
        }
        Ok(QueryRequest {
            base_url,
            filter_expression: filter_expression.to_string(),
            geometry,
        })
    }

    /// Build from a loosely typed parameter map:
    /// `{"layerDefs": {"0": "<filter>"} | "<filter>", "geometry": [xmin, ymin, xmax, ymax]}`.
    pub fn from_params(base_url: &str, params: &Value) -> QueryResult<Self> {
        let params = params
            .as_object()
            .ok_or_else(|| QueryError::invalid("query parameters must be a JSON object"))?;

        let filter = match params.get("layerDefs") {
            Some(Value::String(filter)) => filter.as_str(),
            Some(Value::Object(layers)) => match layers.get(QUERY_LAYER) {
                Some(Value::String(filter)) => filter.as_str(),
                Some(other) => {
                    return Err(QueryError::invalid(format!(
                        "layerDefs.{QUERY_LAYER} must be a string, got {other}"
                    )))
                }
                None => {
                    return Err(QueryError::invalid(format!(
                        "layerDefs has no entry for layer {QUERY_LAYER}"
                    )))
                }
            },
            Some(other) => {
                return Err(QueryError::invalid(format!(
                    "layerDefs must be a string or an object, got {other}"
                )))
            }
            None => return Err(QueryError::invalid("missing layerDefs")),
        };

        let geometry = match params.get("geometry") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => {
                let bounds = items
                    .iter()
                    .map(|v| {
                        v.as_f64().ok_or_else(|| {
                            QueryError::invalid(format!("geometry bound is not a number: {v}"))
                        })
                    })
                    .collect::<QueryResult<Vec<f64>>>()?;
                Some(BoundingBox::from_slice(&bounds)?)
            }
            Some(other) => {
                return Err(QueryError::invalid(format!(
                    "geometry must be an array of 4 numbers, got {other}"
                )))
            }
        };

        QueryRequest::new(base_url, filter, geometry)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn filter_expression(&self) -> &str {
        &self.filter_expression
    }

    pub fn geometry(&self) -> Option<&BoundingBox> {
        self.geometry.as_ref()
    }

    /// The `layerDefs` value, already encoded for the query string.
    pub fn encoded_layer_defs(&self) -> String {
        // {"0":"<filter>"}, with the filter escaped as a JSON string
        let layer_defs = json!({ (QUERY_LAYER): self.filter_expression }).to_string();
        let mut encoded = String::with_capacity(layer_defs.len() * 2);
        for c in layer_defs.chars() {
            match c {
                '{' => encoded.push_str("%7B"),
                '}' => encoded.push_str("%7D"),
                '"' => encoded.push_str("%22"),
                ':' => encoded.push_str("%3A"),
                '\\' => encoded.push_str("%5C"),
                other => encoded.push(other),
            }
        }
        encode_filter(&encoded)
    }

    /// The `geometry` value, percent-encoded; empty when no envelope is set.
    pub fn encoded_geometry(&self) -> String {
        self.geometry
            .map(|bbox| urlencoding::encode(&bbox.to_envelope_json()).into_owned())
            .unwrap_or_default()
    }

    /// Full query URL. The token is appended as given.
    pub fn to_url(&self, token: &str) -> String {
        let params: [(&str, String); 19] = [
            ("layerDefs", self.encoded_layer_defs()),
            ("geometry", self.encoded_geometry()),
            ("geometryType", ENVELOPE_GEOMETRY_TYPE.to_string()),
            ("inSR", String::new()),
            ("spatialRel", "esriSpatialRelIntersects".to_string()),
            ("outSR", String::new()),
            ("datumTransformation", String::new()),
            ("applyVCSProjection", "false".to_string()),
            ("returnGeometry", "true".to_string()),
            ("maxAllowableOffset", String::new()),
            ("geometryPrecision", String::new()),
            ("returnIdsOnly", "false".to_string()),
            ("returnCountOnly", "false".to_string()),
            ("returnDistinctValues", "false".to_string()),
            ("returnZ", "false".to_string()),
            ("returnM", "false".to_string()),
            ("sqlFormat", "none".to_string()),
            ("f", "pjson".to_string()),
            ("token", urlencoding::encode(token).into_owned()),
        ];

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", query_endpoint(&self.base_url), query)
    }
}

/// Space becomes `+`, single quote becomes `%27`; nothing else is touched.
pub fn encode_filter(filter: &str) -> String {
    filter.replace(' ', "+").replace('\'', "%27")
}

/// Parse a service root; only absolute http(s) URLs are accepted.
pub(crate) fn parse_base_url(base_url: &str) -> QueryResult<Url> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| QueryError::invalid(format!("invalid base url {base_url:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(QueryError::invalid(format!(
            "base url must be http or https, got {:?}",
            url.scheme()
        )));
    }
    if url.query().is_some() {
        return Err(QueryError::invalid(format!(
            "base url must not carry a query string: {base_url:?}"
        )));
    }
    if url.fragment().is_some() {
        return Err(QueryError::invalid(format!(
            "base url must not carry a fragment: {base_url:?}"
        )));
    }
    Ok(url)
}

/// Service root without a trailing `/` or `/query`.
pub(crate) fn service_root(base_url: &Url) -> String {
    let root = base_url.as_str().trim_end_matches('/');
    root.strip_suffix("/query").unwrap_or(root).to_string()
}

fn query_endpoint(base_url: &Url) -> String {
    format!("{}/query", service_root(base_url))
}
