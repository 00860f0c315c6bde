//! Configuration types and defaults

use segstream_core::{ConnectionConfig, SegstreamError};
use segstream_media::{BufferMode, FlushPolicy};
use std::time::Duration;

/// Player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// How often the presentation position is sampled for progress events
    pub progress_update_interval: Duration,
    /// Counted errors after which the session is stopped
    pub errors_before_stop: u32,
    /// Buffer mode applied to sinks on creation and after a seek
    pub buffer_mode: BufferMode,
    /// Flush tuning
    pub flush_policy: FlushPolicy,
    /// Transport settings
    pub connection: ConnectionConfig,
    /// Log lifecycle transitions at info level
    pub debug: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            progress_update_interval: Duration::from_millis(100),
            errors_before_stop: 1,
            buffer_mode: BufferMode::Sequence,
            flush_policy: FlushPolicy::default(),
            connection: ConnectionConfig::default(),
            debug: false,
        }
    }
}

impl PlayerConfig {
    /// Set the progress sampling period
    pub fn progress_update_interval(mut self, interval: Duration) -> Self {
        self.progress_update_interval = interval;
        self
    }

    /// Set the error threshold
    pub fn errors_before_stop(mut self, count: u32) -> Self {
        self.errors_before_stop = count;
        self
    }

    /// Set the sink buffer mode
    pub fn buffer_mode(mut self, mode: BufferMode) -> Self {
        self.buffer_mode = mode;
        self
    }

    /// Set the flush policy
    pub fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Set the transport open timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connection.timeout = timeout;
        self
    }

    /// Enable verbose lifecycle logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Check the configuration for values the player cannot work with
    pub fn validate(&self) -> Result<(), SegstreamError> {
        if self.progress_update_interval.is_zero() {
            return Err(invalid("progress_update_interval", "must be greater than zero"));
        }
        if self.errors_before_stop == 0 {
            return Err(invalid("errors_before_stop", "must be at least 1"));
        }
        let min = self.flush_policy.min_removal_length;
        if min.is_nan() || min <= 0.0 {
            return Err(invalid(
                "flush_policy.min_removal_length",
                &format!("must be a positive number, got {}", min),
            ));
        }
        if self.connection.timeout.is_zero() {
            return Err(invalid("connection.timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SegstreamError {
    SegstreamError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlayerConfig::default();
        assert_eq!(config.progress_update_interval, Duration::from_millis(100));
        assert_eq!(config.errors_before_stop, 1);
        assert_eq!(config.buffer_mode, BufferMode::Sequence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = PlayerConfig::default()
            .errors_before_stop(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");

        let err = PlayerConfig::default()
            .progress_update_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("progress_update_interval"));

        let policy = FlushPolicy {
            min_removal_length: f64::NAN,
            ..FlushPolicy::default()
        };
        assert!(PlayerConfig::default()
            .flush_policy(policy)
            .validate()
            .is_err());
    }
}
