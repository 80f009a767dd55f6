//! Observability setup.
//!
//! Installs the tracing subscriber used by the binary. `RUST_LOG` controls the
//! level (default: info); output goes to stderr as text or JSON.

use crate::config::LogFormat;
use std::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), Box<dyn Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false); // Disable ANSI colors for log files

    match format {
        LogFormat::Text => builder.try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }

    info!("Tracing initialized ({} format)", format);
    Ok(())
}
