//! Retry-with-backoff for transient external service failures.

use super::error::{ServiceError, ServiceResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff policy for call-site retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.mul_f64(self.multiplier.powi(retry as i32))
    }
}

/// Run `operation` with bounded retries for retryable errors only.
///
/// Non-retryable errors (not-found, 4xx, parse errors) are returned after
/// the first attempt; retryable classes are retried up to
/// `policy.max_attempts` total attempts with exponential delays.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: BackoffPolicy,
    op_name: &str,
    mut operation: F,
) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    "{} failed ({}), retrying in {:?} (attempt {}/{})",
                    op_name,
                    err,
                    delay,
                    attempt + 1,
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
