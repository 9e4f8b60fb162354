//! Sensor Management API - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments configure through the environment
    let _ = dotenvy::dotenv();

    let settings = Settings::load().context("Failed to load configuration")?;
    init_logging(&settings.logging)?;

    info!("=== Sensor API v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(settings).await
}
