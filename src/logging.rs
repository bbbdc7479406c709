//! Logging setup.
//!
//! Events go to stderr through `tracing-subscriber`. The level comes from the
//! `-v`/`-q` counts unless `RUST_LOG` is set, in which case it wins.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Filter directive for the given verbosity and quietness counts
pub fn default_directive(verbose: u8, quiet: u8) -> &'static str {
    match (verbose, quiet) {
        (_, q) if q >= 2 => "error",
        (_, 1) => "warn",
        (0, _) => "info",
        (1, _) => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber
pub fn init(verbose: u8, quiet: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}
