//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Initialize tracing for the process.
///
/// `RUST_LOG` wins over `config.log_level` when set. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let _ = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
}
