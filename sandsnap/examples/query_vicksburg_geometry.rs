use anyhow::Result;
use sandsnap::collect::global_variables::DEFAULT_FILTER;
use sandsnap::{BoundingBox, ClientConfig, OutputFormat, QueryClient};

/// Example: samples inside an envelope around Vicksburg, MS, as GeoJSON
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = QueryClient::new(ClientConfig::default())?;

    // xmin, ymin, xmax, ymax (WGS84)
    let bbox = BoundingBox::new(-91.0, 32.0, -90.0, 33.0);
    let request = client.request(DEFAULT_FILTER, Some(bbox))?;

    let features =
        client.query_to_file(&request, OutputFormat::GeoJson, "./output/vicksburg.geojson")?;

    println!("Bounding box: {:?}", bbox.as_array());
    println!("  - Samples found: {}", features.len());
    Ok(())
}
