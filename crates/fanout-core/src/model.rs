//! Request/response wire types and request validation.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Incoming processing request.
///
/// Integers are signed so that out-of-range values reach validation instead
/// of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub count: i64,
    pub batch: i64,
    #[serde(default)]
    pub io_delay_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream_url: Option<String>,
}

impl ProcessRequest {
    pub fn new(count: i64, batch: i64) -> Self {
        Self {
            count,
            batch,
            ..Default::default()
        }
    }

    pub fn io_delay_ms(mut self, ms: i64) -> Self {
        self.io_delay_ms = ms;
        self
    }

    pub fn downstream_url(mut self, url: impl Into<String>) -> Self {
        self.downstream_url = Some(url.into());
        self
    }

    /// Check bounds and resolve defaults. Checks run in order: count, batch,
    /// maximum.
    pub fn validate(
        &self,
        max_count: u64,
        default_url: &str,
    ) -> Result<ValidatedRequest, ValidationError> {
        if self.count <= 0 {
            return Err(ValidationError::CountNotPositive {
                requested: self.count,
            });
        }
        if self.batch <= 0 {
            return Err(ValidationError::BatchNotPositive {
                requested: self.batch,
            });
        }
        let count = self.count as u64;
        if count > max_count {
            return Err(ValidationError::CountExceedsMax {
                max_count,
                requested: self.count,
            });
        }

        let downstream_url = match self.downstream_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => default_url.to_string(),
        };

        Ok(ValidatedRequest {
            count,
            batch: self.batch as u64,
            io_delay_ms: self.io_delay_ms.max(0) as u64,
            downstream_url,
        })
    }
}

/// A request that passed validation, with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub count: u64,
    pub batch: u64,
    pub io_delay_ms: u64,
    pub downstream_url: String,
}

/// Result of one processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub ok: bool,
    pub count: u64,
    pub batch: u64,
    pub io_delay_ms: u64,
    pub downstream_url: String,
    pub processed_events: u64,
    pub batches: u64,
    pub external_calls_ok: u64,
    pub external_calls_fail: u64,
    pub duration_ms: u64,
    pub events_per_sec: f64,
    /// RFC 3339 UTC time the run started.
    pub ts: String,
    pub node: String,
    pub notes: String,
}

/// Error payload returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<i64>,
}

impl ErrorBody {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            max_count: None,
            requested: None,
        }
    }
}

impl From<&ValidationError> for ErrorBody {
    fn from(err: &ValidationError) -> Self {
        Self {
            error: err.to_string(),
            max_count: err.max_count(),
            requested: err.max_count().map(|_| err.requested()),
        }
    }
}
