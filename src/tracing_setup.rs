//! Tracing configuration
//!
//! Logs go to stderr so that stdout stays free for command output. The filter
//! comes from RUST_LOG when set, otherwise from the caller's default.

use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing. Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false);

    let initialized = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok();

    if initialized {
        tracing::debug!(filter = default_filter, "tracing initialized");
    }
}
