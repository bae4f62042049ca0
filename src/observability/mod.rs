//! Observability for the gateway
//!
//! - Structured logs through `tracing`, one event per line, each tagged
//!   with a `GatewayEvent` name
//! - Monotonic request counters
//!
//! Observability is read-only: nothing here influences how a request is
//! handled, and a logging failure never fails a request.

mod events;
mod metrics;

pub use events::GatewayEvent;
pub use metrics::{GatewayMetrics, MetricsSnapshot};

use tracing_subscriber::EnvFilter;

/// Install a JSON subscriber writing to stderr.
///
/// Filter comes from `RUST_LOG`, falling back to `default_filter`. Safe to
/// call more than once; later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .try_init();
}
