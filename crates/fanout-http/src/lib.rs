//! fanout-http: `reqwest` downstream client for Fanout.
//!
//! ```rust,no_run
//! use fanout_http::{HttpDownstream, HttpDownstreamConfig};
//! use std::time::Duration;
//!
//! let client = HttpDownstream::new(HttpDownstreamConfig {
//!     request_timeout: Duration::from_millis(500),
//!     ..Default::default()
//! })
//! .unwrap();
//! ```

pub mod client;

pub use client::{HttpDownstream, HttpDownstreamConfig};
