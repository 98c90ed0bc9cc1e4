//! Structured logging.
//!
//! Uses the tracing crate; the filter comes from `RUST_LOG` when set and
//! falls back to the configured log level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive used when `RUST_LOG` is unset.
pub fn default_filter(log_level: &str) -> String {
    format!("kimai_mcp_remote={log_level},tower_http={log_level}")
}

/// Install the global subscriber. Safe to call once per process.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("debug"), "kimai_mcp_remote=debug,tower_http=debug");
    }
}
