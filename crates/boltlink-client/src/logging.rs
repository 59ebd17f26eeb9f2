//! Tracing subscriber configuration.
//!
//! Level conventions across the workspace:
//! - ERROR: connection closed with a non-retryable error
//! - WARN: recoverable failures (retries, dropped frames, refused writes)
//! - INFO: lifecycle events (discovered, link up, session ready)
//! - DEBUG: per-command request/response flow
//! - TRACE: wire-level frames and counters

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level is controlled via `RUST_LOG`; defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` so repeated calls across tests are harmless.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
