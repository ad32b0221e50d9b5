use serde_json::Value;

use crate::collect::transport::HttpResponse;
use crate::error::{QueryError, QueryResult};

/// One record as returned by the service; its schema belongs to the layer.
pub type FeatureRecord = Value;

/// Check the status and parse the body of a 200 response.
///
/// Returns `RequestFailed` for any other status, `NoData` for an empty or
/// unparsable body, and `ServerRejected` when the body carries `error`.
pub fn parse_json_body(response: &HttpResponse) -> QueryResult<Value> {
    if !response.is_ok() {
        return Err(QueryError::RequestFailed {
            status_code: response.status,
        });
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Err(QueryError::NoData);
    }
    let body: Value = serde_json::from_slice(&response.body).map_err(|e| {
        log::debug!("Response body is not JSON: {}", e);
        QueryError::NoData
    })?;
    if let Some(error) = body.get("error") {
        return Err(QueryError::ServerRejected(describe_error(error)));
    }
    if body.is_null() {
        return Err(QueryError::NoData);
    }
    Ok(body)
}

/// Features of the first layer (`layers[0].features`), or top-level
/// `features` for single-layer endpoints.
pub fn extract_features(body: Value) -> QueryResult<Vec<FeatureRecord>> {
    let mut body = match body {
        Value::Object(map) => map,
        _ => return Err(QueryError::NoData),
    };

    let features = match body.remove("layers") {
        Some(Value::Array(layers)) => layers
            .into_iter()
            .next()
            .and_then(|layer| match layer {
                Value::Object(mut layer) => layer.remove("features"),
                _ => None,
            }),
        _ => body.remove("features"),
    };

    match features {
        Some(Value::Array(features)) => Ok(features),
        _ => Err(QueryError::NoData),
    }
}

/// Readable text for an esri `error` payload (`{"code":400,"message":"..."}`)
/// or any other shape.
fn describe_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => {
            let message = map.get("message").and_then(Value::as_str);
            let code = map.get("code").and_then(Value::as_i64);
            match (code, message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.to_string(),
                _ => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}
