use anyhow::{Result, anyhow};
use tracing::Level;

/// Installs the global fmt subscriber with local RFC 3339 timestamps.
pub fn init_tracing(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
