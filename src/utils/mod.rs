//! Transport building blocks used by the crawler engine.
//!
//! - [`HttpClient`]: the pooled reqwest session, behind the [`HttpBackend`] trait
//! - [`MockBackend`]: a scripted [`HttpBackend`] for tests and offline runs
//! - [`RateLimiter`]: FIFO minimum-interval admission for outbound requests
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff with jitter on transient errors
//! - [`ResponseCache`]: in-memory TTL cache keyed by [`Fingerprint`]
//! - [`TransportClient`]: cache, rate limit, retry and decode around one session
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use medcrawler::utils::{with_retry, RetryConfig};
//! use medcrawler::CrawlerError;
//!
//! # async fn fetch_data() -> Result<String, CrawlerError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), CrawlerError> {
//! let config = RetryConfig::default().max_retries(3);
//! let data = with_retry(config, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod http;
mod mock;
mod rate_limit;
mod request;
mod retry;
mod transport;

pub use cache::{CacheStats, Fingerprint, ResponseCache};
pub use http::{HttpBackend, HttpClient, HttpResponse};
pub use mock::{MockBackend, MockCall, MockReply};
pub use rate_limit::RateLimiter;
pub use request::{ApiRequest, Payload, ResponseFormat};
pub use retry::{with_retry, RetryConfig};
pub use transport::TransportClient;
