//! Error types for the processing pipeline.

use thiserror::Error;

/// Errors a single downstream attempt can end with.
///
/// None of these abort a request: the retry executor consumes them and, once
/// attempts run out, records the item as failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownstreamError {
    /// Transport-level failure (connection refused, reset, DNS, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The downstream answered with a non-2xx status.
    #[error("downstream returned HTTP {code}")]
    Status { code: u16 },

    /// No response within the configured request timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl DownstreamError {
    /// Returns `true` if the attempt was cut off by the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Reasons a request is rejected before any downstream call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("count must be > 0")]
    CountNotPositive { requested: i64 },

    #[error("batch must be > 0")]
    BatchNotPositive { requested: i64 },

    #[error("count exceeds maximum allowed")]
    CountExceedsMax { max_count: u64, requested: i64 },
}

impl ValidationError {
    /// The configured maximum, when the rejection was caused by it.
    pub fn max_count(&self) -> Option<u64> {
        match self {
            Self::CountExceedsMax { max_count, .. } => Some(*max_count),
            _ => None,
        }
    }

    /// The offending requested value.
    pub fn requested(&self) -> i64 {
        match self {
            Self::CountNotPositive { requested }
            | Self::BatchNotPositive { requested }
            | Self::CountExceedsMax { requested, .. } => *requested,
        }
    }
}

/// Errors returned by [`crate::Processor::process`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The request was rejected up front; nothing was dispatched.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Processing aborted (worker task panicked, limiter closed). No partial
    /// response is produced.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcessError {
    /// Returns `true` if the caller sent a bad request.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceeds_max_carries_both_values() {
        let err = ValidationError::CountExceedsMax {
            max_count: 10,
            requested: 11,
        };
        assert_eq!(err.max_count(), Some(10));
        assert_eq!(err.requested(), 11);
        assert_eq!(err.to_string(), "count exceeds maximum allowed");
    }

    #[test]
    fn non_positive_has_no_max() {
        let err = ValidationError::BatchNotPositive { requested: 0 };
        assert_eq!(err.max_count(), None);
        assert!(ProcessError::from(err).is_validation());
    }

    #[test]
    fn timeout_detection() {
        assert!(DownstreamError::Timeout { ms: 5 }.is_timeout());
        assert!(!DownstreamError::Status { code: 503 }.is_timeout());
    }
}
