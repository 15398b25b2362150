//! `Processor`: validate, dispatch, aggregate, report.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ProcessorConfig;
use crate::dispatch::Dispatcher;
use crate::downstream::{with_delay_param, Downstream};
use crate::error::ProcessError;
use crate::generator::{Batcher, EventGenerator};
use crate::model::{ProcessRequest, ProcessResponse};
use crate::policy::{RetryExecutor, RetryPolicy};
use crate::report::{ResponseBuilder, RunSummary};

/// Entry point for one processing run per request.
///
/// # Usage
/// ```no_run
/// # async fn example(downstream: std::sync::Arc<dyn fanout_core::Downstream>) {
/// use fanout_core::{ProcessRequest, Processor, ProcessorConfig};
///
/// let processor = Processor::new(ProcessorConfig::default(), downstream);
/// let resp = processor.process(&ProcessRequest::new(100, 10)).await;
/// # }
/// ```
pub struct Processor {
    config: ProcessorConfig,
    dispatcher: Dispatcher,
    responses: ResponseBuilder,
}

impl Processor {
    pub fn new(config: ProcessorConfig, downstream: Arc<dyn Downstream>) -> Self {
        let responses = ResponseBuilder::new(config.ok_policy, notes_for(&config));
        Self::with_responses(config, downstream, responses)
    }

    /// Like [`Processor::new`] with a caller-supplied response builder
    /// (fixed node name in tests, custom notes).
    pub fn with_responses(
        config: ProcessorConfig,
        downstream: Arc<dyn Downstream>,
        responses: ResponseBuilder,
    ) -> Self {
        let executor = RetryExecutor::new(
            downstream,
            RetryPolicy::new(config.retry.clone()),
            config.request_timeout(),
        );
        let dispatcher = Dispatcher::new(config.dispatch, executor);
        Self {
            config,
            dispatcher,
            responses,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn node(&self) -> &str {
        self.responses.node()
    }

    pub fn notes(&self) -> &str {
        self.responses.notes()
    }

    /// Run one request to completion.
    ///
    /// Validation failures return before any downstream call. Item failures
    /// never fail the request; they show up in `external_calls_fail`.
    pub async fn process(&self, req: &ProcessRequest) -> Result<ProcessResponse, ProcessError> {
        let req = req
            .validate(self.config.max_count, &self.config.default_downstream_url)
            .map_err(|e| {
                tracing::warn!(error = %e, requested = e.requested(), "request rejected");
                e
            })?;

        tracing::info!(
            count = req.count,
            batch = req.batch,
            io_delay_ms = req.io_delay_ms,
            downstream_url = %req.downstream_url,
            dispatch = %self.config.dispatch,
            "processing started"
        );

        let started_at = Utc::now();
        let start = Instant::now();

        let batcher = Batcher::new(req.batch as usize);
        let batches = batcher.batch_count(req.count);
        let url: Arc<str> = with_delay_param(&req.downstream_url, req.io_delay_ms).into();

        let tally = self
            .dispatcher
            .run(EventGenerator::new(req.count), batcher, url)
            .await?;
        let elapsed = start.elapsed();

        if tally.processed != req.count || tally.ok + tally.fail != tally.processed {
            return Err(ProcessError::Internal(format!(
                "outcome count mismatch: expected {}, processed {} (ok {}, fail {})",
                req.count, tally.processed, tally.ok, tally.fail
            )));
        }

        let resp = self.responses.build(
            &req,
            &RunSummary {
                started_at,
                elapsed,
                batches,
                tally,
            },
        );

        tracing::info!(
            processed = resp.processed_events,
            ok = resp.external_calls_ok,
            fail = resp.external_calls_fail,
            retries = tally.retries,
            duration_ms = resp.duration_ms,
            events_per_sec = resp.events_per_sec,
            "processing complete"
        );

        Ok(resp)
    }
}

fn notes_for(config: &ProcessorConfig) -> String {
    format!(
        "bounded fan-out via {} with up to {} retries",
        config.dispatch, config.retry.max_retries
    )
}
