use anyhow::Result;
use sandsnap::collect::global_variables::DEFAULT_FILTER;
use sandsnap::{ClientConfig, OutputFormat, QueryClient};

/// Example: download every processed SandSnap sample to JSON
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = QueryClient::new(ClientConfig::default())?;
    let request = client.request(DEFAULT_FILTER, None)?;

    println!("Filter: {}", request.filter_expression());
    let features = client.query_to_file(&request, OutputFormat::Json, "./output/output.json")?;

    println!("  - Samples saved: {}", features.len());
    Ok(())
}
