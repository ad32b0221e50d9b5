use thiserror::Error;

/// Failure reaching the service or reading its reply.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0} s")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Every way a query or attachment download can fail.
///
/// None of these escape as panics: each operation converts transport and
/// parsing faults into one of the variants below.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Bad input, detected before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The service answered with a status other than 200.
    #[error("request failed with status code {status_code}")]
    RequestFailed { status_code: u16 },
    /// 200 response carrying an `error` payload.
    #[error("server rejected the query: {0}")]
    ServerRejected(String),
    /// 200 response without a usable body.
    #[error("no data returned")]
    NoData,
    /// Rendering the feature sequence for the sink failed.
    #[error("failed to render output: {0}")]
    Output(String),
    /// Writing the rendered output to the sink failed.
    #[error("failed to write output: {0}")]
    Sink(#[from] std::io::Error),
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl QueryError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        QueryError::InvalidArgument(msg.into())
    }
}
