//! Sink error types

use segstream_core::SegstreamError;
use thiserror::Error;

/// Error reported by a sink for an append, remove or query
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The sink is still completing a previous operation
    #[error("sink is busy")]
    Busy,

    /// The sink rejected the operation
    #[error("sink rejected operation: {reason}")]
    Rejected {
        /// Reason given by the sink
        reason: String,
    },

    /// The sink was removed from its media source
    #[error("sink has been detached")]
    Detached,
}

/// Result type alias for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

impl SinkError {
    /// Attach the owning track id and convert into the crate-wide error
    pub fn for_track(self, track_id: u32) -> SegstreamError {
        match self {
            SinkError::Detached => SegstreamError::Consistency {
                reason: format!("sink for track {} queried after removal", track_id),
            },
            other => SegstreamError::Sink {
                track_id,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segstream_core::ErrorCategory;

    #[test]
    fn test_sink_error_conversion() {
        let err = SinkError::Rejected {
            reason: "QuotaExceeded".to_string(),
        }
        .for_track(1);
        assert_eq!(err.category(), ErrorCategory::Sink);
        assert_eq!(
            err.to_string(),
            "Sink error on track 1: sink rejected operation: QuotaExceeded"
        );

        let err = SinkError::Detached.for_track(2);
        assert_eq!(err.category(), ErrorCategory::Consistency);
    }
}
