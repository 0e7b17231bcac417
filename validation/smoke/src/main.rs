//! Smoke check for the county open data service.
//!
//! Lists the first parcels and address points, then builds the bundle of
//! the first parcel returned.

use anyhow::{Context, Result};
use clap::Parser;
use open_data::{BundleOptions, ClientSettings, OpenDataClient};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "smoke")]
#[command(about = "Smoke test for the St. Louis County open data MapServer", long_about = None)]
struct Args {
    /// MapServer base URL (defaults to the county Open_Data service)
    #[arg(long, env = "STLCO_GIS_BASE_URL")]
    base_url: Option<String>,

    /// Features listed per layer
    #[arg(short, long, default_value = "5")]
    page_size: usize,

    /// Cap on features collected per layer in the bundle
    #[arg(short, long, default_value = "200")]
    max_features_per_layer: usize,

    /// Attribute holding the parcel number on the parcels layer
    #[arg(long, default_value = "PRCL_NBR")]
    parcel_field: String,

    /// Log level
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();

    let mut settings = ClientSettings::from_env();
    if let Some(url) = &args.base_url {
        settings.base_url = url.clone();
    }
    info!(base_url = %settings.base_url, "Starting smoke check");

    let client = OpenDataClient::new(settings).context("failed to build client")?;

    let parcels = client
        .list_parcels_first_page(Some(args.page_size))
        .await
        .context("failed to list parcels")?;
    let addresses = client
        .list_address_points_first_page(Some(args.page_size))
        .await
        .context("failed to list address points")?;

    println!("parcels: {}", parcels.features.len());
    println!("addresses: {}", addresses.features.len());

    let parcel_number = parcels
        .features
        .first()
        .and_then(|f| f.attribute_text(&args.parcel_field))
        .with_context(|| format!("first parcel has no {} value", args.parcel_field))?;

    let options = BundleOptions::default().max_features_per_layer(args.max_features_per_layer);
    let bundle = client
        .parcel_bundle(&parcel_number, &options)
        .await
        .with_context(|| format!("failed to build bundle for parcel {}", parcel_number))?;

    println!(
        "bundle matches: {} address points: {}",
        bundle.matches.len(),
        bundle.address_points.len()
    );
    for m in &bundle.matches {
        println!(
            "  [{}] {} ({}): {}",
            m.layer_id,
            m.layer_name,
            m.match_method,
            m.features.len()
        );
    }

    client.close();
    Ok(())
}
