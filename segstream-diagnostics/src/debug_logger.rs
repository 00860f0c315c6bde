//! Structured debug logging system

use segstream_core::SegstreamError;
use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "segstream=info";

/// Debug logger for structured logging
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Initialize logging with [`DEFAULT_FILTER`]
    pub fn init_logging() -> Result<(), SegstreamError> {
        Self::init_with_filter(DEFAULT_FILTER)
    }

    /// Initialize logging; `RUST_LOG` wins over `fallback` when set.
    ///
    /// Calling this again after a subscriber is installed is a no-op.
    pub fn init_with_filter(fallback: &str) -> Result<(), SegstreamError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .map_err(|e| SegstreamError::InvalidConfiguration {
                field: "log filter".to_string(),
                reason: e.to_string(),
            })?;

        // An already installed global subscriber is not an error here
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_init_twice_is_harmless() {
        assert_ok!(DebugLogger::init_with_filter("segstream=debug"));
        assert_ok!(DebugLogger::init_logging());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        std::env::remove_var("RUST_LOG");
        assert_err!(DebugLogger::init_with_filter("segstream=notalevel"));
    }
}
