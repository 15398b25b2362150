//! Reliability policies applied to every downstream call.
//!
//! ```text
//! Item → [RetryExecutor: timeout → call → backoff → ...] → ItemOutcome
//! ```

pub mod retry;

pub use retry::{ItemOutcome, RetryConfig, RetryExecutor, RetryPolicy};
