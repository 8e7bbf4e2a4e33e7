//! Process-wide tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber from a level/filter string such
/// as `"info"` or `"synkronus=debug,tower_http=info"`.
pub fn init_logging(level: &str) -> Result<(), String> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level).map_err(|e| format!("invalid log filter: {e}"))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| "logging already initialized".to_string())
}
