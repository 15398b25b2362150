//! fanout-core: bounded-concurrency batch processing for Fanout.
//!
//! # Overview
//!
//! Given a count N, the [`Processor`] synthesizes N items, sends one call per
//! item to a downstream endpoint under a concurrency limit, retries failures
//! with capped exponential backoff and reports counts and throughput.
//!
//! - [`Downstream`]: the async trait every downstream client implements
//! - [`ProcessRequest`] / [`ProcessResponse`]: wire types
//! - [`ProcessError`] / [`DownstreamError`]: structured error types
//! - [`policy`] module: retry policy and per-item retry executor
//! - [`dispatch`] module: wave, window and stream schedulers
//! - [`aggregator`] module: atomic outcome counters

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod downstream;
pub mod error;
pub mod generator;
pub mod model;
pub mod policy;
pub mod processor;
pub mod report;

pub use aggregator::{Aggregator, Tally};
pub use config::{DispatchMode, OkPolicy, ProcessorConfig};
pub use dispatch::Dispatcher;
pub use downstream::{with_delay_param, Downstream};
pub use error::{DownstreamError, ProcessError, ValidationError};
pub use generator::{Batcher, EventGenerator, EventId};
pub use model::{ErrorBody, ProcessRequest, ProcessResponse, ValidatedRequest};
pub use policy::{ItemOutcome, RetryConfig, RetryExecutor, RetryPolicy};
pub use processor::Processor;
pub use report::{ResponseBuilder, RunSummary};
