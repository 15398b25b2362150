//! Final response assembly: duration, throughput, node identity.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

use crate::aggregator::Tally;
use crate::config::OkPolicy;
use crate::model::{ProcessResponse, ValidatedRequest};

/// Placeholder used when the local host name cannot be determined.
pub const UNKNOWN_NODE: &str = "unknown";

/// Measurements taken around one dispatch run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub batches: u64,
    pub tally: Tally,
}

/// `processed * 1000 / duration_ms`, or 0 when no time elapsed.
pub fn events_per_sec(processed: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        0.0
    } else {
        processed as f64 * 1000.0 / duration_ms as f64
    }
}

/// Best-effort host name from the OS. Never fails.
pub fn node_name() -> String {
    let name = gethostname::gethostname();
    match name.to_str().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            tracing::debug!(raw = ?name, "host name lookup failed, using placeholder");
            UNKNOWN_NODE.to_string()
        }
    }
}

/// Builds [`ProcessResponse`]s. Holds the values that are fixed for the
/// lifetime of a processor.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    ok_policy: OkPolicy,
    node: String,
    notes: String,
}

impl ResponseBuilder {
    pub fn new(ok_policy: OkPolicy, notes: impl Into<String>) -> Self {
        Self::with_node(ok_policy, notes, node_name())
    }

    pub fn with_node(ok_policy: OkPolicy, notes: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            ok_policy,
            node: node.into(),
            notes: notes.into(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn build(&self, req: &ValidatedRequest, run: &RunSummary) -> ProcessResponse {
        let duration_ms = run.elapsed.as_millis() as u64;
        ProcessResponse {
            ok: self.ok_policy.evaluate(run.tally.fail),
            count: req.count,
            batch: req.batch,
            io_delay_ms: req.io_delay_ms,
            downstream_url: req.downstream_url.clone(),
            processed_events: run.tally.processed,
            batches: run.batches,
            external_calls_ok: run.tally.ok,
            external_calls_fail: run.tally.fail,
            duration_ms,
            events_per_sec: events_per_sec(run.tally.processed, duration_ms),
            ts: run.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            node: self.node.clone(),
            notes: self.notes.clone(),
        }
    }
}
