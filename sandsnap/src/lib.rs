//! Client for ArcGIS-style feature services such as SandSnap.
//!
//! Builds filtered `query` requests, extracts the first layer's features,
//! writes them as JSON, CSV or GeoJSON, and downloads record attachments.

pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;

pub use collect::attachment::Attachment;
pub use collect::query_client::QueryClient;
pub use collect::request::QueryRequest;
pub use collect::response::FeatureRecord;
pub use collect::transport::{HttpResponse, ReqwestTransport, Transport};
pub use commons::output::OutputFormat;
pub use config::{ClientConfig, QueryJob};
pub use error::{QueryError, QueryResult, TransportError};
pub use geo_core::BoundingBox;
