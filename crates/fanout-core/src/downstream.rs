//! The `Downstream` trait: the external service every item is sent to.

use async_trait::async_trait;

use crate::error::DownstreamError;

/// One call to the external endpoint.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Downstream>`.
#[async_trait]
pub trait Downstream: Send + Sync + 'static {
    /// Issue one request against `url`.
    ///
    /// `Ok(())` means a 2xx-class response arrived within the request
    /// timeout. Everything else is an error for this attempt only.
    async fn call(&self, url: &str) -> Result<(), DownstreamError>;

    /// Identifier used in logs.
    fn name(&self) -> &str {
        "downstream"
    }
}

/// Append the `delay_ms` query parameter to `base`.
///
/// Uses `&` when `base` already carries a query string, `?` otherwise.
pub fn with_delay_param(base: &str, delay_ms: u64) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}delay_ms={delay_ms}")
}
