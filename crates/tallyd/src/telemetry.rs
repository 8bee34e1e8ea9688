//! Logging setup for tallyd.
//!
//! Plain `tracing_subscriber::fmt` output; the filter is whatever the config
//! resolved `telemetry.log_level` to (which `RUST_LOG` already overrides).

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
pub fn init(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log filter '{}'", log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
