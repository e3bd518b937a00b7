//! Logging setup shared by the harvest binaries
//!
//! Output goes to stderr so stdout stays free for records and reports.
//! `RUST_LOG` overrides the default `info` level.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Level used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from a `RUST_LOG`-style directive string
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber; later calls are no-ops
pub fn init_logging() {
    INIT.call_once(|| {
        let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(directives.as_deref()))
            .with_writer(std::io::stderr)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults_to_info() {
        assert_eq!(env_filter(None).to_string(), "info");
        assert_eq!(env_filter(Some("")).to_string(), "info");
        assert_eq!(env_filter(Some("mdl_harvest=debug")).to_string(), "mdl_harvest=debug");
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
