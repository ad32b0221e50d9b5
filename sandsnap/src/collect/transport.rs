use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::TransportError;

/// Status and raw body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// The single seam between the client and the network.
///
/// Implementations hold no per-call state, so one transport can be shared
/// by several threads, each issuing its own queries.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;

    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("sandsnap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("failed to create HTTP client: {e}")))?;
        Ok(ReqwestTransport { client })
    }

    pub fn with_client(client: Client) -> Self {
        ReqwestTransport { client }
    }

    fn finish(
        result: reqwest::Result<reqwest::blocking::Response>,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let response = result.map_err(|e| classify(e, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| match classify(e, timeout) {
                TransportError::Timeout(secs) => TransportError::Timeout(secs),
                other => TransportError::Body(other.to_string()),
            })?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        Self::finish(self.client.get(url).timeout(timeout).send(), timeout)
    }

    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        Self::finish(
            self.client.post(url).form(form).timeout(timeout).send(),
            timeout,
        )
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_secs())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
