//! HTTP downstream client backed by `reqwest`.
//!
//! One `GET` per attempt. A 2xx status within the request timeout is a
//! success; the body is discarded. Retrying is the caller's job.

use async_trait::async_trait;
use std::time::Duration;

use fanout_core::downstream::Downstream;
use fanout_core::error::DownstreamError;

/// Configuration for `HttpDownstream`.
#[derive(Debug, Clone)]
pub struct HttpDownstreamConfig {
    pub request_timeout: Duration,
    /// Idle connections kept per host; match it to the dispatch limit.
    pub max_idle_per_host: usize,
    pub connect_timeout: Duration,
}

impl Default for HttpDownstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2_000),
            max_idle_per_host: 128,
            connect_timeout: Duration::from_millis(1_000),
        }
    }
}

/// `reqwest`-backed [`Downstream`].
pub struct HttpDownstream {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpDownstream {
    pub fn new(config: HttpDownstreamConfig) -> Result<Self, DownstreamError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DownstreamError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self, DownstreamError> {
        Self::new(HttpDownstreamConfig::default())
    }

    fn map_err(&self, e: reqwest::Error) -> DownstreamError {
        if e.is_timeout() {
            DownstreamError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            DownstreamError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl Downstream for HttpDownstream {
    async fn call(&self, url: &str) -> Result<(), DownstreamError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        // Drain so the connection goes back to the pool. A 2xx only counts
        // once its body has arrived in full.
        let body = resp.bytes().await;

        if !status.is_success() {
            if let Err(e) = body {
                tracing::debug!(error = %e, status = status.as_u16(), "discarding unreadable error body");
            }
            return Err(DownstreamError::Status {
                code: status.as_u16(),
            });
        }

        body.map(|_| ()).map_err(|e| {
            tracing::debug!(error = %e, status = status.as_u16(), "response body read failed");
            self.map_err(e)
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
