use anyhow::{Context, Result};
use sandsnap::{ClientConfig, QueryClient};

/// Example: download the photo attached to one sample
///
/// Usage: cargo run --example attachment_from_record -- [objectid]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let record_id: u64 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "2120".to_string())
        .parse()
        .context("objectid must be an integer")?;

    let client = QueryClient::new(ClientConfig::default())?;
    let attachment = client
        .fetch_attachment(record_id)
        .with_context(|| format!("No attachment downloaded for record {}", record_id))?;

    let path = attachment.save_in("./output/images")?;
    println!(
        "Saved {} ({} bytes) to {:?}",
        attachment.content_type.as_deref().unwrap_or("unknown type"),
        attachment.data.len(),
        path
    );
    Ok(())
}
