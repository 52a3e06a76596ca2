//! Tracing setup for embedding applications
//!
//! The library itself only emits `tracing` events; the host process decides
//! where they go. This helper installs a stdout subscriber filtered by the
//! `RUST_LOG` environment variable (default `info`).

use tracing_subscriber::EnvFilter;

/// Install a stdout tracing subscriber. Call once at process startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
