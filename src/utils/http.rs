//! HTTP client utilities.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::CrawlerConfig;
use crate::sources::CrawlerError;

/// A raw HTTP response, before status classification and decoding
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// `Retry-After` header in seconds, if present
    pub retry_after: Option<u64>,

    /// `Content-Type` header, if present
    pub content_type: Option<String>,

    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// A JSON response with the given status
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            retry_after: None,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    /// A plain response with the given status and body
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            content_type: None,
            body: body.into(),
        }
    }

    /// Set the `Retry-After` value
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

/// Issues a single GET request. Implemented by the reqwest session and by test doubles.
#[async_trait]
pub trait HttpBackend: Send + Sync + std::fmt::Debug {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CrawlerError>;
}

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with the user agent and timeout from `config`
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, CrawlerError> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| CrawlerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl HttpBackend for HttpClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CrawlerError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            retry_after,
            content_type,
            body,
        })
    }
}
