//! Processor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::policy::RetryConfig;

/// How item operations are scheduled.
///
/// Every mode keeps the number of outstanding downstream operations at or
/// below [`DispatchMode::limit`] and waits for every item before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// Sequential groups of `width` items, each group fully awaited before
    /// the next one starts.
    Wave { width: usize },
    /// Sliding window of spawned tasks; a new item starts as soon as any
    /// in-flight item finishes.
    Window { limit: usize },
    /// Batches merged `batch_concurrency` at a time, items inside a batch
    /// merged `item_concurrency` at a time.
    Stream {
        batch_concurrency: usize,
        item_concurrency: usize,
    },
}

impl DispatchMode {
    /// Upper bound on simultaneously in-flight item operations.
    pub fn limit(&self) -> usize {
        match *self {
            Self::Wave { width } => width.max(1),
            Self::Window { limit } => limit.max(1),
            Self::Stream {
                batch_concurrency,
                item_concurrency,
            } => batch_concurrency.max(1) * item_concurrency.max(1),
        }
    }

    /// Short name used in logs, notes and `/info`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wave { .. } => "wave",
            Self::Window { .. } => "window",
            Self::Stream { .. } => "stream",
        }
    }
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Window { limit: 128 }
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Wave { width } => write!(f, "wave(width={width})"),
            Self::Window { limit } => write!(f, "window(limit={limit})"),
            Self::Stream {
                batch_concurrency,
                item_concurrency,
            } => write!(
                f,
                "stream(batches={batch_concurrency}, items={item_concurrency})"
            ),
        }
    }
}

/// What the top-level `ok` flag of a response means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OkPolicy {
    /// `ok` is true whenever processing ran to completion, regardless of how
    /// many items failed.
    #[default]
    Completed,
    /// `ok` additionally requires every item to have succeeded.
    NoFailures,
}

impl OkPolicy {
    pub fn evaluate(&self, failed: u64) -> bool {
        match self {
            Self::Completed => true,
            Self::NoFailures => failed == 0,
        }
    }
}

impl std::str::FromStr for OkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "completed" => Ok(Self::Completed),
            "no_failures" => Ok(Self::NoFailures),
            other => Err(format!("unknown ok policy '{other}'")),
        }
    }
}

/// Top-level processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Largest `count` a single request may ask for.
    #[serde(default = "default_max_count")]
    pub max_count: u64,
    /// Used when a request carries no (or a blank) downstream URL.
    #[serde(default = "default_downstream_url")]
    pub default_downstream_url: String,
    /// Per-attempt downstream timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default)]
    pub ok_policy: OkPolicy,
}

fn default_max_count() -> u64 { 200_000 }
fn default_downstream_url() -> String { "http://slow-io:8080/slow".into() }
fn default_request_timeout_ms() -> u64 { 2_000 }

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            default_downstream_url: default_downstream_url(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
            dispatch: DispatchMode::default(),
            ok_policy: OkPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.retry.max_retries = n;
        self
    }

    pub fn max_count(mut self, n: u64) -> Self {
        self.max_count = n;
        self
    }

    pub fn ok_policy(mut self, policy: OkPolicy) -> Self {
        self.ok_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_limit_is_product() {
        let mode = DispatchMode::Stream {
            batch_concurrency: 4,
            item_concurrency: 64,
        };
        assert_eq!(mode.limit(), 256);
    }

    #[test]
    fn zero_limits_clamp_to_one() {
        assert_eq!(DispatchMode::Window { limit: 0 }.limit(), 1);
        assert_eq!(DispatchMode::Wave { width: 0 }.limit(), 1);
    }

    #[test]
    fn defaults_from_empty_json() {
        let cfg: ProcessorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_count, 200_000);
        assert_eq!(cfg.request_timeout_ms, 2_000);
        assert_eq!(cfg.retry.max_retries, 1);
        assert_eq!(cfg.dispatch, DispatchMode::Window { limit: 128 });
        assert_eq!(cfg.ok_policy, OkPolicy::Completed);
    }

    #[test]
    fn dispatch_mode_tagged_json() {
        let mode: DispatchMode =
            serde_json::from_str(r#"{"mode":"stream","batch_concurrency":2,"item_concurrency":8}"#)
                .unwrap();
        assert_eq!(mode.name(), "stream");
        assert_eq!(mode.limit(), 16);
    }

    #[test]
    fn ok_policy_parse_and_evaluate() {
        let p: OkPolicy = "no-failures".parse().unwrap();
        assert!(!p.evaluate(1));
        assert!(p.evaluate(0));
        assert!(OkPolicy::Completed.evaluate(5));
        assert!("bogus".parse::<OkPolicy>().is_err());
    }
}
