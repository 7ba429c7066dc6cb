use std::time::Instant;

use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Logs go to stderr; stdout is reserved for protocol traffic.
pub fn init_logging(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_ascii_lowercase()));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

pub fn log_request_summary(method: &str, outcome: &str, started_at: Instant) {
    info!(
        method = %method,
        outcome = outcome,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "request summary"
    );
}
