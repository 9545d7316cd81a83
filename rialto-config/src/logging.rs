//! Logging initialization.
//!
//! A plain `tracing_subscriber::fmt` + `EnvFilter` setup in the same shape as the workspace's
//! daemon logging helper, minus the vendor (Posthog/Sentry) wiring that belongs to a server
//! process rather than a client library.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a global `tracing` subscriber. `default_level` is used when `RIALTO_LOG` (or
/// `RUST_LOG`, checked as a fallback) is unset.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("RIALTO_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Parse a log level string, defaulting to `INFO` for anything unrecognized.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("DEBUG"), tracing::Level::DEBUG);
        assert_eq!(parse_level("Info"), tracing::Level::INFO);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level("nonsense"), tracing::Level::INFO);
        assert_eq!(parse_level(""), tracing::Level::INFO);
    }
}
