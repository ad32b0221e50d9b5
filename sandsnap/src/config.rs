use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::global_variables::{
    DEFAULT_FILTER, DEFAULT_LAYER, DEFAULT_TIMEOUT_SECS, SANDSNAP_SERVICE_URL, TEMP_PATH,
};
use crate::collect::query_client::QueryClient;
use crate::collect::request::QueryRequest;
use crate::commons::output::OutputFormat;
use crate::geo_core::BoundingBox;

/// Service connection settings passed to [`QueryClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// FeatureServer root, e.g. `https://.../FeatureServer`.
    pub base_url: String,
    /// Layer used for attachment lookups.
    pub layer: u32,
    pub timeout_secs: u64,
    /// Sent as the `token` parameter; empty for public services.
    pub token: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: SANDSNAP_SERVICE_URL.to_string(),
            layer: DEFAULT_LAYER,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            token: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// One download: what to ask for and where to put it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryJob {
    pub filter: String,
    pub geometry: Option<BoundingBox>,
    pub save_path: PathBuf,
    /// Inferred from `save_path` when absent.
    pub format: Option<OutputFormat>,
}

impl Default for QueryJob {
    fn default() -> Self {
        QueryJob {
            filter: DEFAULT_FILTER.to_string(),
            geometry: None,
            save_path: PathBuf::from(TEMP_PATH).join("output.json"),
            format: None,
        }
    }
}

impl QueryJob {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
            .unwrap_or_else(|| OutputFormat::from_path(&self.save_path))
    }

    /// Validate the job against `client`'s service and run it to `save_path`.
    pub fn run(&self, client: &QueryClient) -> Result<usize> {
        let request: QueryRequest = client
            .request(&self.filter, self.geometry)
            .context("Invalid query job")?;
        let features = client
            .query_to_file(&request, self.output_format(), &self.save_path)
            .with_context(|| format!("Query job for {:?} failed", self.save_path))?;
        Ok(features.len())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).context(format!("Failed to open config file: {:?}", path))?;
    serde_json::from_str(&text).context(format!("Failed to parse config file: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.layer, 0);
        assert!(config.token.is_empty());
        assert!(config.base_url.ends_with("/FeatureServer"));
    }

    #[test]
    fn test_client_config_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        fs::write(&path, r#"{"base_url": "https://example.com/FeatureServer", "timeout_secs": 10}"#)
            .unwrap();
        let config = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(config.base_url, "https://example.com/FeatureServer");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.layer, DEFAULT_LAYER);
    }

    #[test]
    fn test_client_config_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        fs::write(&path, r#"{"url": "https://example.com"}"#).unwrap();
        assert!(ClientConfig::from_json_file(&path).is_err());
        assert!(ClientConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_query_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(
            &path,
            r#"{"filter": "location_state = 'OR'", "geometry": [-91, 32, -90, 33], "save_path": "out/or.csv"}"#,
        )
        .unwrap();
        let job = QueryJob::from_json_file(&path).unwrap();
        assert_eq!(job.filter, "location_state = 'OR'");
        assert_eq!(job.geometry, Some(BoundingBox::new(-91.0, 32.0, -90.0, 33.0)));
        assert_eq!(job.output_format(), OutputFormat::Csv);
    }

    #[test]
    fn test_query_job_bad_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(&path, r#"{"geometry": [-90, 32, -91, 33]}"#).unwrap();
        assert!(QueryJob::from_json_file(&path).is_err());
    }

    #[test]
    fn test_query_job_explicit_format_wins() {
        let job = QueryJob {
            save_path: PathBuf::from("out.json"),
            format: Some(OutputFormat::GeoJson),
            ..QueryJob::default()
        };
        assert_eq!(job.output_format(), OutputFormat::GeoJson);
        assert_eq!(QueryJob::default().output_format(), OutputFormat::Json);
    }
}
