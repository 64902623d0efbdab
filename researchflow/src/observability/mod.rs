//! Tracing setup for hosts that do not bring their own subscriber.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber with env-filter support.
///
/// Reads `RUST_LOG` for the filter, defaulting to `info`. Safe to call more
/// than once; later calls are no-ops if a subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
