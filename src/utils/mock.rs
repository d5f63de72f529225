//! Scripted HTTP backend for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;
use url::Url;

use super::{HttpBackend, HttpResponse};
use crate::sources::CrawlerError;

/// What the mock returns for one request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this response
    Response(HttpResponse),
    /// Fail at the transport level
    NetworkError(String),
    /// Never complete; exercises timeouts and cancellation
    Hang,
}

impl From<HttpResponse> for MockReply {
    fn from(response: HttpResponse) -> Self {
        MockReply::Response(response)
    }
}

/// A request observed by [`MockBackend`]
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: Url,
    pub at: Instant,
}

impl MockCall {
    /// Path with the leading slash removed
    pub fn path(&self) -> &str {
        self.url.path().trim_start_matches('/')
    }

    /// First value of a query parameter
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

#[derive(Debug, Default)]
struct MockState {
    queued: HashMap<String, VecDeque<MockReply>>,
    always: HashMap<String, MockReply>,
    calls: Vec<MockCall>,
}

/// Mock backend keyed by URL path
///
/// Queued replies for a path are served first, in order; after that the
/// `always` reply for the path is used, and unknown paths answer 404.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a one-shot reply for `path`
    pub fn enqueue(&self, path: &str, reply: impl Into<MockReply>) -> &Self {
        self.state()
            .queued
            .entry(path.trim_start_matches('/').to_string())
            .or_default()
            .push_back(reply.into());
        self
    }

    /// Reply to every otherwise unscripted request for `path`
    pub fn always(&self, path: &str, reply: impl Into<MockReply>) -> &Self {
        self.state()
            .always
            .insert(path.trim_start_matches('/').to_string(), reply.into());
        self
    }

    /// Every request seen so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Requests seen for one path
    pub fn calls_to(&self, path: &str) -> Vec<MockCall> {
        let path = path.trim_start_matches('/');
        self.state()
            .calls
            .iter()
            .filter(|call| call.path() == path)
            .cloned()
            .collect()
    }

    fn next_reply(&self, url: &Url) -> MockReply {
        let mut state = self.state();
        state.calls.push(MockCall {
            url: url.clone(),
            at: Instant::now(),
        });

        let path = url.path().trim_start_matches('/').to_string();
        if let Some(reply) = state.queued.get_mut(&path).and_then(VecDeque::pop_front) {
            return reply;
        }
        state
            .always
            .get(&path)
            .cloned()
            .unwrap_or_else(|| MockReply::Response(HttpResponse::text(404, "Not Found")))
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn get(&self, url: &Url) -> Result<HttpResponse, CrawlerError> {
        match self.next_reply(url) {
            MockReply::Response(response) => Ok(response),
            MockReply::NetworkError(message) => Err(CrawlerError::TransientNetwork(message)),
            MockReply::Hang => std::future::pending::<Result<HttpResponse, CrawlerError>>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(path: &str) -> Url {
        Url::parse("http://mock.test/")
            .unwrap()
            .join(path)
            .unwrap()
    }

    #[tokio::test]
    async fn test_queue_then_always_then_404() {
        let backend = MockBackend::new();
        backend
            .enqueue("search", HttpResponse::json(200, &json!({"n": 1})))
            .always("search", HttpResponse::json(200, &json!({"n": 2})));

        let first = backend.get(&url("search?q=x")).await.unwrap();
        assert_eq!(first.body, r#"{"n":1}"#);

        let second = backend.get(&url("search")).await.unwrap();
        let third = backend.get(&url("search")).await.unwrap();
        assert_eq!(second.body, r#"{"n":2}"#);
        assert_eq!(third.body, r#"{"n":2}"#);

        let missing = backend.get(&url("other")).await.unwrap();
        assert_eq!(missing.status, 404);

        assert_eq!(backend.call_count(), 4);
        assert_eq!(backend.calls_to("/search").len(), 3);
        assert_eq!(backend.calls()[0].query_param("q").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_network_error() {
        let backend = MockBackend::new();
        backend.enqueue("x", MockReply::NetworkError("connection reset".into()));

        let err = backend.get(&url("x")).await.unwrap_err();
        assert!(matches!(err, CrawlerError::TransientNetwork(_)));
    }
}
