//! Structured logging setup shared by both binaries.

use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber.
///
/// `RUST_LOG` always takes precedence when set; otherwise the level comes
/// from config. `json` switches to line-delimited JSON output for log
/// aggregation.
pub fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
