//! Error types for segstream

use std::time::Duration;
use thiserror::Error;

/// Main error type for segstream operations
#[derive(Error, Debug)]
pub enum SegstreamError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Transport error (open/send/close)
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// Transport is not open
    #[error("Transport is not connected")]
    NotConnected,

    /// Transport open timed out
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Malformed control frame
    #[error("Parse error: {reason}")]
    Parse {
        /// What could not be parsed
        reason: String,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content (possibly truncated)
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Sink rejected an append or remove
    #[error("Sink error on track {track_id}: {reason}")]
    Sink {
        /// Track owning the sink
        track_id: u32,
        /// Reason reported by the sink
        reason: String,
    },

    /// Internal bookkeeping disagreed with the sinks
    #[error("Consistency error: {reason}")]
    Consistency {
        /// Description of the inconsistency
        reason: String,
    },

    /// Presentation element failure
    #[error("Presentation error: {reason}")]
    Presentation {
        /// Reason reported by the presentation element
        reason: String,
    },

    /// Track not found error
    #[error("Track not found: {track_id}")]
    TrackNotFound {
        /// Track id
        track_id: u32,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Too many errors, session stopped
    #[error("Error threshold exceeded: {count} errors (limit {threshold})")]
    ErrorThresholdExceeded {
        /// Errors counted in this session
        count: u32,
        /// Configured threshold
        threshold: u32,
    },
}

impl SegstreamError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            SegstreamError::Initialization { .. } => "INITIALIZATION_FAILED",
            SegstreamError::MissingConfiguration { .. } => "MISSING_CONFIGURATION",
            SegstreamError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            SegstreamError::Transport { .. } => "TRANSPORT_ERROR",
            SegstreamError::NotConnected => "NOT_CONNECTED",
            SegstreamError::Timeout { .. } => "TIMEOUT",
            SegstreamError::Parse { .. } => "PARSE_ERROR",
            SegstreamError::InvalidMessage { .. } => "INVALID_MESSAGE",
            SegstreamError::Sink { .. } => "SINK_ERROR",
            SegstreamError::Consistency { .. } => "CONSISTENCY_ERROR",
            SegstreamError::Presentation { .. } => "PRESENTATION_ERROR",
            SegstreamError::TrackNotFound { .. } => "TRACK_NOT_FOUND",
            SegstreamError::InvalidState { .. } => "INVALID_STATE",
            SegstreamError::ErrorThresholdExceeded { .. } => "ERROR_THRESHOLD_EXCEEDED",
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            SegstreamError::Initialization { .. }
            | SegstreamError::MissingConfiguration { .. }
            | SegstreamError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            SegstreamError::Transport { .. }
            | SegstreamError::NotConnected
            | SegstreamError::Timeout { .. } => ErrorCategory::Transport,
            SegstreamError::Parse { .. } | SegstreamError::InvalidMessage { .. } => {
                ErrorCategory::Parse
            }
            SegstreamError::Sink { .. } | SegstreamError::TrackNotFound { .. } => {
                ErrorCategory::Sink
            }
            SegstreamError::Consistency { .. } => ErrorCategory::Consistency,
            SegstreamError::Presentation { .. } => ErrorCategory::Presentation,
            SegstreamError::InvalidState { .. }
            | SegstreamError::ErrorThresholdExceeded { .. } => ErrorCategory::State,
        }
    }

    /// Whether a failure while dispatching a frame of this kind is counted
    /// against the session's error threshold.
    pub fn counts_toward_threshold(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Parse | ErrorCategory::Sink
        )
    }

    /// Shorthand for a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        SegstreamError::Parse {
            reason: reason.into(),
        }
    }

    /// Shorthand for a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        SegstreamError::Transport {
            reason: reason.into(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Connection open/send/close failures
    Transport,
    /// Malformed frames
    Parse,
    /// Sink append/remove failures
    Sink,
    /// Bookkeeping mismatches (flush bound, removed sinks)
    Consistency,
    /// Presentation element failures
    Presentation,
    /// State management errors
    State,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err = SegstreamError::parse("missing type");
        assert_eq!(err.category(), ErrorCategory::Parse);
        assert!(err.counts_toward_threshold());

        let err = SegstreamError::transport("socket closed");
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(!err.counts_toward_threshold());

        let err = SegstreamError::Consistency {
            reason: "flush bound".to_string(),
        };
        assert_eq!(err.error_code(), "CONSISTENCY_ERROR");
        assert!(!err.counts_toward_threshold());
    }

    #[test]
    fn test_error_display() {
        let error = SegstreamError::Sink {
            track_id: 2,
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(error.to_string(), "Sink error on track 2: quota exceeded");

        let error = SegstreamError::ErrorThresholdExceeded {
            count: 3,
            threshold: 3,
        };
        assert_eq!(
            error.to_string(),
            "Error threshold exceeded: 3 errors (limit 3)"
        );
    }
}
