//! Capped exponential backoff and the per-item retry loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::downstream::Downstream;
use crate::error::DownstreamError;

/// Configuration for the retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Cap on any single delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff on each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Add `jitter_fraction * backoff / 2` on top of each delay (0.0 = none).
    #[serde(default)]
    pub jitter_fraction: f64,
}

fn default_max_retries() -> u32 { 1 }
fn default_initial_backoff_ms() -> u64 { 100 }
fn default_max_backoff_ms() -> u64 { 300 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter_fraction: 0.0,
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay to sleep after the `attempt`-th failed try (1-based),
    /// i.e. `min(initial * multiplier^(attempt-1), max)`.
    /// Returns `None` once `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff_ms as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);

        let jitter_ms = capped * self.config.jitter_fraction * 0.5;
        let total_ms = (capped + jitter_ms) as u64;

        Some(Duration::from_millis(total_ms))
    }

    /// Total tries an item gets, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }
}

/// Terminal result for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemOutcome {
    pub ok: bool,
    /// Tries made, first one included.
    pub attempts: u32,
}

impl ItemOutcome {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Drives one item's downstream call through the retry policy.
///
/// Cheap to clone; shared by every in-flight item of a request.
#[derive(Clone)]
pub struct RetryExecutor {
    downstream: Arc<dyn Downstream>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RetryExecutor {
    pub fn new(downstream: Arc<dyn Downstream>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            downstream,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, url: &str) -> Result<(), DownstreamError> {
        match tokio::time::timeout(self.timeout, self.downstream.call(url)).await {
            Ok(result) => result,
            Err(_) => Err(DownstreamError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Call `url` until it succeeds or the policy gives up. Never fails: an
    /// exhausted item comes back with `ok == false`.
    pub async fn execute(&self, url: &str) -> ItemOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(url).await {
                Ok(()) => {
                    return ItemOutcome { ok: true, attempts: attempt };
                }
                Err(e) => match self.policy.next_delay(attempt) {
                    Some(delay) => {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            downstream = self.downstream.name(),
                            "retrying downstream call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::debug!(
                            attempt,
                            error = %e,
                            downstream = self.downstream.name(),
                            "retries exhausted"
                        );
                        return ItemOutcome { ok: false, attempts: attempt };
                    }
                },
            }
        }
    }
}
