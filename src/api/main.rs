//! `cors-mgt`: provisions the CORS management database.
//!
//! Loads settings from the environment, connects, and applies pending schema
//! migrations so the services can run against the database.

use anyhow::{Context, anyhow};
use cors_management::config::CorsSettings;
use cors_management::middleware::init_tracing;
use cors_management::storage;
use tracing::{error, info};

// Panic hook to log panics through tracing
fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        error!("Panic at {}: {}", location, panic_info);
    }));
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = CorsSettings::from_env().context("Failed to load settings")?;

    init_tracing(settings.log_format).map_err(|e| anyhow!("Failed to initialize tracing: {}", e))?;
    setup_panic_hook();

    info!(
        "Starting cors-mgt (database: {}, max connections: {})",
        settings.database_url, settings.max_connections
    );

    let pool = storage::connect(&settings)
        .await
        .with_context(|| format!("Failed to prepare database {}", settings.database_url))?;

    info!("CORS management schema is up to date");
    pool.close().await;
    Ok(())
}
