//! Observability: in-process metrics and tracing setup.

pub mod metrics;

pub use metrics::RelayMetrics;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
