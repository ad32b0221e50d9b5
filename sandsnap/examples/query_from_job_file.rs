use anyhow::{Context, Result};
use sandsnap::{ClientConfig, QueryClient, QueryJob};

/// Example: run a query described by JSON files
///
/// Usage: cargo run --example query_from_job_file -- job.json [client.json]
///
/// job.json:    {"filter": "objectid=2120", "save_path": "./output/2120.json"}
/// client.json: {"base_url": "https://.../FeatureServer", "timeout_secs": 5}
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let job_path = args.next().context("missing job file argument")?;
    let job = QueryJob::from_json_file(&job_path)?;
    let config = match args.next() {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };

    let client = QueryClient::new(config)?;
    let count = job.run(&client)?;

    println!("{} features written to {:?}", count, job.save_path);
    Ok(())
}
