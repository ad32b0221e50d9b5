use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use url::Url;

use crate::collect::attachment::{Attachment, AttachmentListing};
use crate::collect::request::{parse_base_url, service_root, QueryRequest};
use crate::collect::response::{extract_features, parse_json_body, FeatureRecord};
use crate::collect::transport::{ReqwestTransport, Transport};
use crate::commons::output::OutputFormat;
use crate::config::ClientConfig;
use crate::error::{QueryError, QueryResult};
use crate::geo_core::BoundingBox;

/// Client for an ArcGIS-style feature service.
///
/// Holds configuration and a transport only; every call owns its own
/// request and response, so a client can be shared across threads.
#[derive(Clone)]
pub struct QueryClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl QueryClient {
    /// Client backed by a blocking `reqwest` transport.
    pub fn new(config: ClientConfig) -> QueryResult<Self> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        QueryClient { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Request against the configured service.
    pub fn request(
        &self,
        filter_expression: &str,
        geometry: Option<BoundingBox>,
    ) -> QueryResult<QueryRequest> {
        QueryRequest::new(&self.config.base_url, filter_expression, geometry)
    }

    /// Run one query and return the first layer's features unmodified.
    pub fn query(&self, request: &QueryRequest) -> QueryResult<Vec<FeatureRecord>> {
        let url = request.to_url(&self.config.token);
        log::debug!("Query URL: {}", redact_token(&url, &self.config.token));

        let response = self
            .transport
            .get(&url, self.timeout())
            .map_err(|e| {
                log::warn!("Query transport failure: {}", e);
                QueryError::from(e)
            })?;

        let features = parse_json_body(&response)
            .and_then(extract_features)
            .map_err(|e| {
                log::warn!("Query failed: {}", e);
                e
            })?;

        log::info!(
            "Retrieved {} features from {}",
            features.len(),
            request.base_url()
        );
        Ok(features)
    }

    /// Query and write the rendered result to `sink`.
    ///
    /// The output is rendered completely before the first byte is written;
    /// on any error the sink is left untouched.
    pub fn query_to_writer<W: Write>(
        &self,
        request: &QueryRequest,
        format: OutputFormat,
        sink: &mut W,
    ) -> QueryResult<Vec<FeatureRecord>> {
        let features = self.query(request)?;
        let rendered = format.render(&features)?;
        sink.write_all(&rendered)?;
        sink.flush()?;
        Ok(features)
    }

    /// Query and replace the file at `path` with the rendered result.
    ///
    /// The file is written through a temporary sibling and moved into place,
    /// so a failed call never leaves a partial or truncated file behind.
    pub fn query_to_file(
        &self,
        request: &QueryRequest,
        format: OutputFormat,
        path: impl AsRef<Path>,
    ) -> QueryResult<Vec<FeatureRecord>> {
        let path = path.as_ref();
        let features = self.query(request)?;
        let rendered = format.render(&features)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&rendered)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| QueryError::Sink(e.error))?;

        log::info!(
            "Saved {} features as {} to {:?}",
            features.len(),
            format,
            path
        );
        Ok(features)
    }

    /// Listing URL for a record's attachments on the configured layer.
    pub fn attachments_url(&self, record_id: u64) -> QueryResult<Url> {
        let base = parse_base_url(&self.config.base_url)?;
        let listing = format!(
            "{}/{}/{}/attachments",
            service_root(&base),
            self.config.layer,
            record_id
        );
        Url::parse(&listing)
            .map_err(|e| QueryError::invalid(format!("invalid attachment url {listing:?}: {e}")))
    }

    /// Download the first attachment of `record_id`.
    pub fn fetch_attachment(&self, record_id: u64) -> QueryResult<Attachment> {
        let listing_url = self.attachments_url(record_id)?;
        log::debug!("Attachment listing URL: {}", listing_url);

        let form = [("f", "pjson"), ("token", self.config.token.as_str())];
        let response = self
            .transport
            .post_form(listing_url.as_str(), &form, self.timeout())
            .map_err(|e| {
                log::warn!("Attachment listing transport failure: {}", e);
                QueryError::from(e)
            })?;
        let body = parse_json_body(&response).map_err(|e| {
            log::warn!("Attachment listing for record {} failed: {}", record_id, e);
            e
        })?;

        let listing: AttachmentListing = serde_json::from_value(body).map_err(|e| {
            log::warn!("Unexpected attachment listing shape: {}", e);
            QueryError::NoData
        })?;
        let info = listing
            .attachment_infos
            .into_iter()
            .next()
            .ok_or(QueryError::NoData)?;

        let mut payload_url = info.resolve(&listing_url)?;
        if !self.config.token.is_empty() {
            payload_url
                .query_pairs_mut()
                .append_pair("token", &self.config.token);
        }
        log::debug!(
            "Attachment URL: {}",
            redact_token(payload_url.as_str(), &self.config.token)
        );

        let response = self
            .transport
            .get(payload_url.as_str(), self.timeout())
            .map_err(|e| {
                log::warn!("Attachment transport failure: {}", e);
                QueryError::from(e)
            })?;
        if !response.is_ok() {
            log::warn!(
                "Attachment download for record {} failed with status {}",
                record_id,
                response.status
            );
            return Err(QueryError::RequestFailed {
                status_code: response.status,
            });
        }

        log::info!(
            "Fetched attachment {} ({} bytes) for record {}",
            info.id,
            response.body.len(),
            record_id
        );
        Ok(Attachment {
            record_id,
            id: info.id,
            name: info.name,
            content_type: info.content_type,
            data: response.body,
        })
    }
}

fn redact_token(url: &str, token: &str) -> String {
    if token.is_empty() {
        url.to_string()
    } else {
        let encoded = urlencoding::encode(token);
        url.replace(token, "***").replace(encoded.as_ref(), "***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::transport::HttpResponse;
    use crate::error::TransportError;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const BASE: &str = "https://example.com/arcgis/rest/services/survey/FeatureServer";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Get(String, Duration),
        Post(String, Vec<(String, String)>),
    }

    /// Replays canned responses in order and records every call.
    #[derive(Default)]
    struct FakeTransport {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeTransport {
        fn new(replies: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(FakeTransport {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self) -> Result<HttpResponse, TransportError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no reply queued".into())))
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Get(url.to_string(), timeout));
            self.next()
        }

        fn post_form(
            &self,
            url: &str,
            form: &[(&str, &str)],
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            let form = form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.calls
                .lock()
                .unwrap()
                .push(Call::Post(url.to_string(), form));
            self.next()
        }
    }

    fn client(transport: Arc<FakeTransport>) -> QueryClient {
        let config = ClientConfig {
            base_url: BASE.to_string(),
            ..ClientConfig::default()
        };
        QueryClient::with_transport(config, transport)
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, body))
    }

    const ONE_FEATURE: &str = r#"{"layers":[{"features":[{"attributes":{"objectid":2120}}]}]}"#;

    #[test]
    fn test_query_returns_first_layer_features() {
        let transport = FakeTransport::new(vec![ok(ONE_FEATURE)]);
        let client = client(transport.clone());
        let request = client.request("objectid=2120", None).unwrap();

        let features = client.query(&request).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["attributes"]["objectid"], 2120);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Get(url, timeout) => {
                assert!(url.starts_with(&format!("{BASE}/query?layerDefs=")));
                assert_eq!(*timeout, Duration::from_secs(5));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_query_to_writer_404_leaves_sink_empty() {
        let transport = FakeTransport::new(vec![Ok(HttpResponse::new(404, "Not Found"))]);
        let client = client(transport.clone());
        let request = client.request("objectid=2120", None).unwrap();

        let mut sink = Vec::new();
        let err = client
            .query_to_writer(&request, OutputFormat::Json, &mut sink)
            .unwrap_err();
        assert!(matches!(err, QueryError::RequestFailed { status_code: 404 }));
        assert!(sink.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_server_error_body_leaves_sink_empty() {
        let transport = FakeTransport::new(vec![ok(r#"{"error": "bad filter"}"#)]);
        let client = client(transport);
        let request = client.request("objectid = = 2120", None).unwrap();

        let mut sink = Vec::new();
        let err = client
            .query_to_writer(&request, OutputFormat::Json, &mut sink)
            .unwrap_err();
        assert!(matches!(err, QueryError::ServerRejected(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_empty_body_is_no_data() {
        let client = client(FakeTransport::new(vec![ok("")]));
        let request = client.request("objectid=2120", None).unwrap();
        assert!(matches!(client.query(&request), Err(QueryError::NoData)));
    }

    #[test]
    fn test_transport_failure_is_returned_not_raised() {
        let transport = FakeTransport::new(vec![Err(TransportError::Timeout(5))]);
        let client = client(transport.clone());
        let request = client.request("objectid=2120", None).unwrap();
        let err = client.query(&request).unwrap_err();
        assert!(matches!(err, QueryError::Transport(TransportError::Timeout(5))));
        // no retry
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_invalid_params_make_no_call() {
        let transport = FakeTransport::new(vec![ok(ONE_FEATURE)]);
        let client = client(transport.clone());
        let err = QueryRequest::from_params(BASE, &json!({"layerDefs": 0})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
        assert!(client.request("", None).is_err());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_query_to_writer_json_round_trip() {
        let client = client(FakeTransport::new(vec![ok(ONE_FEATURE)]));
        let request = client.request("objectid=2120", None).unwrap();

        let mut sink = Vec::new();
        let features = client
            .query_to_writer(&request, OutputFormat::Json, &mut sink)
            .unwrap();
        let written: Vec<FeatureRecord> = serde_json::from_slice(&sink).unwrap();
        assert_eq!(written, features);
    }

    #[test]
    fn test_query_to_file_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("output.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale content that is longer than the new one ......").unwrap();

        let client = client(FakeTransport::new(vec![ok(ONE_FEATURE)]));
        let request = client.request("objectid=2120", None).unwrap();
        client
            .query_to_file(&request, OutputFormat::Json, &path)
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!([{"attributes": {"objectid": 2120}}]));
    }

    #[test]
    fn test_query_to_file_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, "[]").unwrap();
        let missing = dir.path().join("missing.csv");

        let client = client(FakeTransport::new(vec![
            Ok(HttpResponse::new(500, "")),
            Ok(HttpResponse::new(500, "")),
        ]));
        let request = client.request("objectid=2120", None).unwrap();
        assert!(client
            .query_to_file(&request, OutputFormat::Json, &path)
            .is_err());
        assert!(client
            .query_to_file(&request, OutputFormat::Csv, &missing)
            .is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_fetch_attachment_by_field_name() {
        let transport = FakeTransport::new(vec![
            ok(r#"{"attachmentInfos":[{"id":7,"contentType":"image/jpeg","name":"photo.jpg"},{"id":8}]}"#),
            Ok(HttpResponse::new(200, vec![0xff, 0xd8, 0xff, 0xe0])),
        ]);
        let client = client(transport.clone());

        let attachment = client.fetch_attachment(2120).unwrap();
        assert_eq!(attachment.id, 7);
        assert_eq!(attachment.name.as_deref(), Some("photo.jpg"));
        assert_eq!(attachment.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(attachment.data, vec![0xff, 0xd8, 0xff, 0xe0]);

        let calls = transport.calls();
        assert_eq!(
            calls[0],
            Call::Post(
                format!("{BASE}/0/2120/attachments"),
                vec![("f".into(), "pjson".into()), ("token".into(), String::new())]
            )
        );
        assert_eq!(
            calls[1],
            Call::Get(format!("{BASE}/0/2120/attachments/7"), Duration::from_secs(5))
        );
    }

    #[test]
    fn test_fetch_attachment_failures() {
        let client_404 = client(FakeTransport::new(vec![Ok(HttpResponse::new(404, ""))]));
        assert!(matches!(
            client_404.fetch_attachment(1),
            Err(QueryError::RequestFailed { status_code: 404 })
        ));

        let client_empty = client(FakeTransport::new(vec![ok(r#"{"attachmentInfos":[]}"#)]));
        assert!(matches!(client_empty.fetch_attachment(1), Err(QueryError::NoData)));

        let client_rejected = client(FakeTransport::new(vec![ok(
            r#"{"error":{"code":404,"message":"Requested object not found."}}"#,
        )]));
        assert!(matches!(
            client_rejected.fetch_attachment(1),
            Err(QueryError::ServerRejected(_))
        ));

        let client_payload_404 = client(FakeTransport::new(vec![
            ok(r#"{"attachmentInfos":[{"id":7}]}"#),
            Ok(HttpResponse::new(404, "")),
        ]));
        assert!(matches!(
            client_payload_404.fetch_attachment(1),
            Err(QueryError::RequestFailed { status_code: 404 })
        ));
    }

    #[test]
    fn test_token_is_forwarded_and_redacted() {
        let transport = FakeTransport::new(vec![ok(ONE_FEATURE)]);
        let config = ClientConfig {
            base_url: BASE.to_string(),
            token: "s3cret".to_string(),
            ..ClientConfig::default()
        };
        let client = QueryClient::with_transport(config, transport.clone());
        let request = client.request("objectid=2120", None).unwrap();
        client.query(&request).unwrap();

        match &transport.calls()[0] {
            Call::Get(url, _) => {
                assert!(url.ends_with("&token=s3cret"));
                assert!(!redact_token(url, "s3cret").contains("s3cret"));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_encoded_token_is_redacted() {
        let token = "ab/c+d=";
        let transport = FakeTransport::new(vec![ok(ONE_FEATURE)]);
        let config = ClientConfig {
            base_url: BASE.to_string(),
            token: token.to_string(),
            ..ClientConfig::default()
        };
        let client = QueryClient::with_transport(config, transport.clone());
        let request = client.request("objectid=2120", None).unwrap();
        client.query(&request).unwrap();

        match &transport.calls()[0] {
            Call::Get(url, _) => {
                assert!(url.ends_with("&token=ab%2Fc%2Bd%3D"), "{url}");
                let redacted = redact_token(url, token);
                assert!(redacted.ends_with("&token=***"), "{redacted}");
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_token_added_to_attachment_link_with_query() {
        let transport = FakeTransport::new(vec![
            ok(r#"{"attachmentInfos":[{"id":7,"url":"7?size=full"}]}"#),
            Ok(HttpResponse::new(200, vec![1, 2, 3])),
        ]);
        let config = ClientConfig {
            base_url: BASE.to_string(),
            token: "s3cret".to_string(),
            ..ClientConfig::default()
        };
        let client = QueryClient::with_transport(config, transport.clone());
        client.fetch_attachment(2120).unwrap();

        assert_eq!(
            transport.calls()[1],
            Call::Get(
                format!("{BASE}/0/2120/attachments/7?size=full&token=s3cret"),
                Duration::from_secs(5)
            )
        );
    }

    #[test]
    fn test_client_is_shareable_across_threads() {
        let transport = FakeTransport::new(vec![ok(ONE_FEATURE), ok(ONE_FEATURE)]);
        let client = client(transport.clone());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let client = client.clone();
                std::thread::spawn(move || {
                    let request = client.request("objectid=2120", None).unwrap();
                    let mut sink = Vec::new();
                    client
                        .query_to_writer(&request, OutputFormat::Json, &mut sink)
                        .unwrap();
                    sink
                })
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap().is_empty());
        }
        assert_eq!(transport.calls().len(), 2);
    }
}
