//! Cached, rate-limited, retrying transport around one HTTP session.

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{
    with_retry, ApiRequest, HttpBackend, HttpResponse, Payload, RateLimiter, ResponseCache,
    ResponseFormat, RetryConfig,
};
use crate::config::CrawlerConfig;
use crate::sources::CrawlerError;

/// Longest slice of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 200;

/// Issues requests for one crawler
///
/// Owns the session handle, the rate limiter and the response cache. All
/// three live exactly as long as the transport; dropping it releases the
/// session.
#[derive(Debug)]
pub struct TransportClient {
    base_url: Url,
    backend: Arc<dyn HttpBackend>,
    limiter: RateLimiter,
    cache: ResponseCache,
    retry: RetryConfig,
    timeout: Duration,
}

impl TransportClient {
    pub fn new(
        base_url: &str,
        config: &CrawlerConfig,
        backend: Arc<dyn HttpBackend>,
    ) -> Result<Self, CrawlerError> {
        // Url::join replaces the last segment unless the base ends in '/'
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        tracing::debug!("Opening HTTP session for {}", base_url);

        Ok(Self {
            base_url,
            backend,
            limiter: RateLimiter::new(config.min_interval()),
            cache: ResponseCache::new(config.cache_ttl(), config.cache_max_entries),
            retry: RetryConfig::from_crawler_config(config),
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Absolute URL for a request
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, CrawlerError> {
        let mut url = self
            .base_url
            .join(request.endpoint.trim_start_matches('/'))?;
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(
                request
                    .params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }
        Ok(url)
    }

    /// Fetch and decode a request, consulting the cache first
    ///
    /// A cache hit performs no network activity and does not consume a rate
    /// limiter slot. On a miss every attempt, retries included, waits for the
    /// limiter before going to the network.
    pub async fn fetch(&self, request: &ApiRequest) -> Result<Arc<Payload>, CrawlerError> {
        let fingerprint = request.fingerprint();
        if let Some(payload) = self.cache.get(&fingerprint) {
            return Ok(payload);
        }

        let url = self.url_for(request)?;
        // The query string may carry an api_key, so only the path is logged
        tracing::debug!("GET {} ({})", url.path(), fingerprint);

        let payload = with_retry(self.retry, || self.attempt(&url, request.format)).await?;
        let payload = Arc::new(payload);
        self.cache.put(fingerprint, payload.clone());
        Ok(payload)
    }

    async fn attempt(&self, url: &Url, format: ResponseFormat) -> Result<Payload, CrawlerError> {
        self.limiter.acquire().await;

        let response = tokio::time::timeout(self.timeout, self.backend.get(url))
            .await
            .map_err(|_| {
                CrawlerError::TransientNetwork(format!(
                    "request timed out after {:?}",
                    self.timeout
                ))
            })??;

        let body = classify(response)?;
        Payload::decode(format, body)
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        tracing::debug!("Closing HTTP session for {}", self.base_url);
    }
}

/// Map an HTTP status to success or a classified error
fn classify(response: HttpResponse) -> Result<String, CrawlerError> {
    match response.status {
        200..=299 => Ok(response.body),
        429 => Err(CrawlerError::RateLimited {
            retry_after: response.retry_after,
        }),
        status @ 500..=599 => Err(CrawlerError::UpstreamServer {
            status,
            message: truncate(&response.body),
        }),
        status @ 400..=499 => Err(CrawlerError::UpstreamClient {
            status,
            message: truncate(&response.body),
        }),
        status => Err(CrawlerError::MalformedResponse(format!(
            "unexpected HTTP status {}",
            status
        ))),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MockBackend, MockReply};
    use serde_json::json;
    use tokio::time::Instant;

    fn config() -> CrawlerConfig {
        CrawlerConfig::default()
            .with_min_interval(Duration::from_millis(100))
            .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50))
            .with_max_retries(2)
    }

    fn transport(config: &CrawlerConfig, backend: &Arc<MockBackend>) -> TransportClient {
        TransportClient::new("http://mock.test/api", config, backend.clone()).unwrap()
    }

    #[test]
    fn test_url_for_joins_endpoint_and_params() {
        let backend = Arc::new(MockBackend::new());
        let client = transport(&config(), &backend);

        let request = ApiRequest::json("/studies")
            .param("query.term", "heart attack")
            .param("filter.advanced", "AREA[StartDate]RANGE[2023-01-01,MAX]");
        let url = client.url_for(&request).unwrap();

        assert_eq!(url.path(), "/api/studies");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("query.term".into(), "heart attack".into()));
        assert_eq!(
            pairs[1],
            ("filter.advanced".into(), "AREA[StartDate]RANGE[2023-01-01,MAX]".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_caches_successful_payloads() {
        let backend = Arc::new(MockBackend::new());
        backend.always("api/items", HttpResponse::json(200, &json!({"ok": true})));
        let client = transport(&config(), &backend);
        let request = ApiRequest::json("items").param("a", 1);

        let first = client.fetch(&request).await.unwrap();
        let second = client.fetch(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(client.cache().stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry_goes_back_to_network() {
        let backend = Arc::new(MockBackend::new());
        backend.always("api/items", HttpResponse::json(200, &json!([])));
        let config = config().with_cache_ttl(Duration::from_secs(5));
        let client = transport(&config, &backend);
        let request = ApiRequest::json("items");

        client.fetch(&request).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        client.fetch(&request).await.unwrap();

        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_respect_rate_limit() {
        let backend = Arc::new(MockBackend::new());
        backend
            .enqueue("api/items", HttpResponse::text(503, "busy"))
            .enqueue("api/items", MockReply::NetworkError("reset".into()))
            .enqueue("api/items", HttpResponse::json(200, &json!({"ok": 1})));
        let client = transport(&config(), &backend);
        assert_eq!(client.limiter().min_interval(), Duration::from_millis(100));

        client.fetch(&ApiRequest::json("items")).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_classification() {
        let backend = Arc::new(MockBackend::new());
        backend
            .always("api/missing", HttpResponse::text(404, "x".repeat(1000)))
            .always("api/limited", HttpResponse::text(429, "").with_retry_after(1))
            .always("api/broken", HttpResponse::text(200, "not json"));
        let client = transport(&config(), &backend);

        match client.fetch(&ApiRequest::json("missing")).await {
            Err(CrawlerError::UpstreamClient { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message.len(), 200);
            }
            other => panic!("Expected UpstreamClient, got {:?}", other),
        }
        assert_eq!(backend.calls_to("api/missing").len(), 1);

        match client.fetch(&ApiRequest::json("limited")).await {
            Err(CrawlerError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, CrawlerError::RateLimited { retry_after: Some(1) }));
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }

        let broken = client.fetch(&ApiRequest::json("broken")).await;
        assert!(matches!(broken, Err(CrawlerError::MalformedResponse(_))));
        assert_eq!(backend.calls_to("api/broken").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let backend = Arc::new(MockBackend::new());
        backend
            .enqueue("api/slow", MockReply::Hang)
            .enqueue("api/slow", HttpResponse::json(200, &json!({})));
        let config = config().with_request_timeout(Duration::from_secs(2));
        let client = transport(&config, &backend);

        let start = Instant::now();
        client.fetch(&ApiRequest::json("slow")).await.unwrap();

        assert_eq!(backend.call_count(), 2);
        assert!(Instant::now() - start >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_drop_releases_backend() {
        let backend = Arc::new(MockBackend::new());
        let client = transport(&config(), &backend);
        assert_eq!(Arc::strong_count(&backend), 2);

        drop(client);
        assert_eq!(Arc::strong_count(&backend), 1);
    }
}
