//! Bounded-concurrency dispatch of item operations.
//!
//! Three schedulers share one contract: at most [`DispatchMode::limit`]
//! items are in flight at any instant, every item reaches a terminal outcome
//! exactly once, and [`Dispatcher::run`] returns only after the last one.
//! Completion order is unspecified in all of them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{join_all, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::task::{JoinError, JoinSet};

use crate::aggregator::{Aggregator, Tally};
use crate::config::DispatchMode;
use crate::error::ProcessError;
use crate::generator::{Batcher, EventGenerator};
use crate::policy::{ItemOutcome, RetryExecutor};

/// Drives every generated item through the retry executor.
#[derive(Clone)]
pub struct Dispatcher {
    mode: DispatchMode,
    executor: RetryExecutor,
}

impl Dispatcher {
    pub fn new(mode: DispatchMode, executor: RetryExecutor) -> Self {
        Self { mode, executor }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Process every item of `events` against `url` and return the final
    /// counters. `batcher` only shapes the outer unit in stream mode.
    pub async fn run(
        &self,
        events: EventGenerator,
        batcher: Batcher,
        url: Arc<str>,
    ) -> Result<Tally, ProcessError> {
        let aggregator = Arc::new(Aggregator::new());
        tracing::debug!(mode = %self.mode, items = events.total(), "dispatch starting");

        match self.mode {
            DispatchMode::Wave { .. } => self.run_waves(events, &url, &aggregator).await?,
            DispatchMode::Window { .. } => self.run_window(events, url, &aggregator).await?,
            DispatchMode::Stream {
                batch_concurrency,
                item_concurrency,
            } => {
                let tally = self
                    .run_stream(events, batcher, &url, batch_concurrency, item_concurrency)
                    .await?;
                aggregator.record_tally(tally);
            }
        }

        Ok(aggregator.snapshot())
    }

    /// Fixed groups of `limit` items; the next group starts only after the
    /// slowest item of the current one.
    async fn run_waves(
        &self,
        events: EventGenerator,
        url: &str,
        aggregator: &Aggregator,
    ) -> Result<(), ProcessError> {
        for wave in Batcher::new(self.mode.limit()).chunks(events) {
            let outcomes = join_all(wave.iter().map(|_| self.execute_inline(url))).await;
            for outcome in outcomes {
                aggregator.record(outcome?);
            }
        }
        Ok(())
    }

    /// Sliding window of spawned tasks. A slot is refilled as soon as any
    /// in-flight item finishes.
    async fn run_window(
        &self,
        events: EventGenerator,
        url: Arc<str>,
        aggregator: &Arc<Aggregator>,
    ) -> Result<(), ProcessError> {
        let limit = self.mode.limit();
        let mut tasks = JoinSet::new();

        for _event in events {
            if tasks.len() >= limit {
                if let Some(joined) = tasks.join_next().await {
                    reap(joined)?;
                }
            }
            let executor = self.executor.clone();
            let url = Arc::clone(&url);
            let aggregator = Arc::clone(aggregator);
            tasks.spawn(async move {
                aggregator.record(executor.execute(&url).await);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            reap(joined)?;
        }
        Ok(())
    }

    /// Two-level merge: batches `batch_concurrency` at a time, items within a
    /// batch `item_concurrency` at a time, results folded into one tally.
    async fn run_stream(
        &self,
        events: EventGenerator,
        batcher: Batcher,
        url: &str,
        batch_concurrency: usize,
        item_concurrency: usize,
    ) -> Result<Tally, ProcessError> {
        let item_concurrency = item_concurrency.max(1);
        stream::iter(batcher.chunks(events))
            .map(|batch| async move {
                stream::iter(batch)
                    .map(|_event| self.execute_inline(url))
                    .buffer_unordered(item_concurrency)
                    .try_fold(Tally::default(), |acc, outcome| async move {
                        Ok::<_, ProcessError>(acc.add(outcome))
                    })
                    .await
            })
            .buffer_unordered(batch_concurrency.max(1))
            .try_fold(Tally::default(), |acc, batch| async move {
                Ok::<_, ProcessError>(acc.merge(batch))
            })
            .await
    }

    /// Executes one item on the calling task. A panic becomes
    /// `ProcessError::Internal`, matching what `JoinSet` reports in window mode.
    async fn execute_inline(&self, url: &str) -> Result<ItemOutcome, ProcessError> {
        AssertUnwindSafe(self.executor.execute(url))
            .catch_unwind()
            .await
            .map_err(|panic| {
                ProcessError::Internal(format!("item panicked: {}", panic_message(&*panic)))
            })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn reap(joined: Result<(), JoinError>) -> Result<(), ProcessError> {
    joined.map_err(|e| ProcessError::Internal(format!("item task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::Downstream;
    use crate::error::DownstreamError;
    use crate::policy::{RetryConfig, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and records the highest number seen in flight at once.
    #[derive(Default)]
    struct Gauge {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_every: usize,
    }

    #[async_trait]
    impl Downstream for Gauge {
        async fn call(&self, _url: &str) -> Result<(), DownstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_every > 0 && n % self.fail_every == 0 {
                Err(DownstreamError::Status { code: 500 })
            } else {
                Ok(())
            }
        }
    }

    struct Panics;

    #[async_trait]
    impl Downstream for Panics {
        async fn call(&self, _url: &str) -> Result<(), DownstreamError> {
            panic!("boom");
        }
    }

    fn dispatcher(mode: DispatchMode, ds: Arc<dyn Downstream>) -> Dispatcher {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 0,
            ..Default::default()
        });
        Dispatcher::new(mode, RetryExecutor::new(ds, policy, Duration::from_secs(1)))
    }

    async fn run(mode: DispatchMode, count: u64, gauge: Arc<Gauge>) -> Tally {
        dispatcher(mode, gauge)
            .run(EventGenerator::new(count), Batcher::new(10), Arc::from("http://x"))
            .await
            .unwrap()
    }

    fn modes() -> Vec<DispatchMode> {
        vec![
            DispatchMode::Wave { width: 7 },
            DispatchMode::Window { limit: 7 },
            DispatchMode::Stream {
                batch_concurrency: 2,
                item_concurrency: 3,
            },
        ]
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_mode_stays_within_limit() {
        for mode in modes() {
            let gauge = Arc::new(Gauge::default());
            let tally = run(mode, 95, gauge.clone()).await;
            assert_eq!(tally.processed, 95, "{mode}");
            let peak = gauge.peak.load(Ordering::SeqCst);
            assert!(peak <= mode.limit(), "{mode}: peak {peak} > {}", mode.limit());
            assert!(peak >= 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_is_called_exactly_once() {
        for mode in modes() {
            let gauge = Arc::new(Gauge {
                fail_every: 4,
                ..Default::default()
            });
            let tally = run(mode, 40, gauge.clone()).await;
            assert_eq!(gauge.calls.load(Ordering::SeqCst), 40, "{mode}");
            assert_eq!(tally.ok + tally.fail, 40, "{mode}");
            assert_eq!(tally.fail, 10, "{mode}");
        }
    }

    #[tokio::test]
    async fn window_uses_full_width() {
        let gauge = Arc::new(Gauge::default());
        run(DispatchMode::Window { limit: 5 }, 50, gauge.clone()).await;
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn count_smaller_than_limit() {
        for mode in modes() {
            let gauge = Arc::new(Gauge::default());
            let tally = run(mode, 1, gauge.clone()).await;
            assert_eq!(tally.processed, 1);
            assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn panicking_item_is_internal_error_in_every_mode() {
        for mode in modes() {
            let err = dispatcher(mode, Arc::new(Panics))
                .run(EventGenerator::new(3), Batcher::new(1), Arc::from("http://x"))
                .await
                .unwrap_err();
            assert!(matches!(err, ProcessError::Internal(_)), "{mode}: {err}");
        }
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "non-string panic payload");
    }
}
