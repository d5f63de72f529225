//! Configuration management.
//!
//! A [`CrawlerConfig`] is built once per crawler and shared read-only for the
//! crawler's lifetime. It can be constructed in code with the `with_*` methods,
//! or loaded from an optional TOML file layered with `MEDCRAWLER_*` environment
//! variables:
//!
//! ```toml
//! contact_email = "you@example.org"
//! api_key = "ncbi-api-key"
//! min_interval_secs = 0.1
//! max_retries = 5
//! cache_ttl_secs = 600
//! batch_concurrency = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::CrawlerError;

/// Environment variable prefix used by [`load_config`]
pub const ENV_PREFIX: &str = "MEDCRAWLER";

/// Crawler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Override for the provider base URL (each source has a fixed default)
    pub base_url: Option<String>,

    /// User agent sent with every request
    pub user_agent: String,

    /// Contact email, sent to providers that grant identified clients higher limits
    pub contact_email: Option<String>,

    /// API key, sent to providers that accept one
    pub api_key: Option<String>,

    /// Tool name reported to NCBI E-utilities
    pub tool_name: String,

    /// Minimum spacing between the start of two outbound requests, in seconds
    pub min_interval_secs: f64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    pub retry_base_delay_ms: u64,

    /// Upper bound for a single backoff delay, in milliseconds
    pub max_retry_delay_ms: u64,

    /// Response cache time-to-live, in seconds (0 disables caching)
    pub cache_ttl_secs: u64,

    /// Maximum number of cached responses
    pub cache_max_entries: usize,

    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,

    /// Maximum number of concurrent fetches in a batch
    pub batch_concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: default_user_agent(),
            contact_email: None,
            api_key: None,
            tool_name: env!("CARGO_PKG_NAME").to_string(),
            // NCBI allows 3 requests/second without an API key
            min_interval_secs: 0.34,
            max_retries: 3,
            retry_base_delay_ms: 250,
            max_retry_delay_ms: 10_000,
            cache_ttl_secs: 3600,
            cache_max_entries: 1000,
            request_timeout_secs: 30,
            batch_concurrency: 5,
        }
    }
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl CrawlerConfig {
    /// Set the base URL override
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the contact email
    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the minimum interval between requests
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_secs = interval.as_secs_f64();
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff base delay and cap
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = base.as_millis() as u64;
        self.max_retry_delay_ms = max.as_millis() as u64;
        self
    }

    /// Set the cache time-to-live
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the batch concurrency ceiling
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> Result<(), CrawlerError> {
        if Duration::try_from_secs_f64(self.min_interval_secs).is_err() {
            return Err(CrawlerError::Config(format!(
                "min_interval_secs must be a non-negative number, got {}",
                self.min_interval_secs
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CrawlerError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(CrawlerError::Config(
                "batch_concurrency must be positive".to_string(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(CrawlerError::Config(
                "cache_max_entries must be positive".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.retry_base_delay_ms {
            return Err(CrawlerError::Config(
                "max_retry_delay_ms must not be below retry_base_delay_ms".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(CrawlerError::Config("user_agent must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Load configuration from an optional file, overridden by `MEDCRAWLER_*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<CrawlerConfig, CrawlerError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    let config: CrawlerConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Find a configuration file in the default locations
///
/// Looks for `./medcrawler.toml`, then `<config dir>/medcrawler/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("medcrawler.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml"))
        .filter(|path| path.is_file())
}
