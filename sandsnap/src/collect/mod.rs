pub mod attachment;
pub mod global_variables;
pub mod query_client;
pub mod request;
pub mod response;
pub mod transport;
