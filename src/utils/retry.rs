//! Retry utilities with exponential backoff for resilient API calls.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::CrawlerConfig;
use crate::sources::CrawlerError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Base delay; retry `k` waits `base * 2^(k-1)` plus jitter in `[0, base)`
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Retry settings from a crawler configuration
    pub fn from_crawler_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.max_retry_delay(),
        }
    }

    /// Set the retry budget
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Backoff before retry `retry` (1-based), with `jitter` in `[0, 1)`
    pub fn backoff_delay(&self, retry: u32, jitter: f64) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay = base * 2f64.powi(exponent) + base * jitter.clamp(0.0, 1.0);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before retry `retry` after `error`, honouring `Retry-After`
    fn delay_for(&self, retry: u32, error: &CrawlerError) -> Duration {
        let jitter = rand::rng().random::<f64>();
        let delay = self.backoff_delay(retry, jitter);

        match error {
            CrawlerError::RateLimited {
                retry_after: Some(seconds),
            } => delay.max(Duration::from_secs(*seconds)).min(self.max_delay),
            _ => delay,
        }
    }
}

/// Execute an async operation with retry logic
///
/// Retryable errors (see [`CrawlerError::is_retryable`]) are retried up to
/// `config.max_retries` times; the last one is then wrapped in
/// [`CrawlerError::RetryExhausted`]. Any other error is returned immediately.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> Result<T, CrawlerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CrawlerError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => {
                if attempts > config.max_retries {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(CrawlerError::RetryExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }

                let delay = config.delay_for(attempts, &error);
                tracing::warn!(
                    "Transient error on attempt {}: {}, retrying in {:?}",
                    attempts,
                    error,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}
