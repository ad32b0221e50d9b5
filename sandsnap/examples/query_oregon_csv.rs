use anyhow::Result;
use sandsnap::collect::global_variables::DEFAULT_FILTER;
use sandsnap::{ClientConfig, OutputFormat, QueryClient};

/// Example: processed samples from Oregon, written as CSV
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = QueryClient::new(ClientConfig::default())?;
    let filter = format!("{} AND location_state = 'OR'", DEFAULT_FILTER);
    let request = client.request(&filter, None)?;

    let features = client.query_to_file(&request, OutputFormat::Csv, "./output/oregon.csv")?;

    println!("Samples in Oregon: {}", features.len());
    Ok(())
}
