//! Provider adapters with a small capability trait.
//!
//! This module defines the [`SourceAdapter`] trait that every provider implements.
//! An adapter never performs I/O itself: it builds requests and extracts data from
//! decoded payloads, while the [`Crawler`](crate::Crawler) engine owns pagination,
//! rate limiting, retries, and caching.
//!
//! # Feature Flags
//!
//! Individual sources can be disabled at compile time using Cargo features:
//!
//! - `pubmed` - Enable the PubMed E-utilities adapter (default: enabled)
//! - `clinical_trials` - Enable the ClinicalTrials.gov v2 adapter (default: enabled)
//!
//! # Implementing a New Source
//!
//! 1. Create a struct that implements `SourceAdapter`
//! 2. Choose a cursor type that carries the provider's pagination state
//! 3. Implement request building and payload extraction
//! 4. Override the batch hooks if the provider accepts many ids per call

#[cfg(feature = "source-clinical-trials")]
mod clinical_trials;
pub mod mock;
#[cfg(feature = "source-pubmed")]
mod pubmed;

#[cfg(feature = "source-clinical-trials")]
pub use clinical_trials::{ClinicalTrialsAdapter, ClinicalTrialsCursor};
pub use mock::MockAdapter;
#[cfg(feature = "source-pubmed")]
pub use pubmed::{PubMedAdapter, PubMedCursor, EFETCH_MAX_IDS};

use crate::models::{ItemMetadata, SearchQuery, SourceType};
use crate::utils::{ApiRequest, Payload};

/// One page of search results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<C> {
    /// Identifiers on this page, in provider order
    pub ids: Vec<String>,

    /// Cursor for the next page, or `None` at end of results
    pub next: Option<C>,
}

/// The capability interface each provider supplies to the crawler engine.
pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    /// Provider-specific pagination state; `Default` is the start of the result set
    type Cursor: Clone + Default + Send + Sync + std::fmt::Debug;

    /// Unique identifier for this source (e.g., "pubmed")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Source type stamped on extracted items
    fn source_type(&self) -> SourceType;

    /// Base URL used when the configuration does not override it
    fn default_base_url(&self) -> &str;

    /// Build the request for the page at `cursor`
    fn build_search_request(
        &self,
        query: &SearchQuery,
        cursor: &Self::Cursor,
    ) -> Result<ApiRequest, CrawlerError>;

    /// Extract identifiers and the next cursor from a search payload
    fn extract_ids(&self, payload: &Payload, cursor: &Self::Cursor)
        -> Result<Page<Self::Cursor>, CrawlerError>;

    /// Build the metadata request for one identifier
    fn build_metadata_request(&self, id: &str) -> Result<ApiRequest, CrawlerError>;

    /// Extract the metadata for `id` from a metadata payload
    fn extract_metadata(&self, id: &str, payload: &Payload) -> Result<ItemMetadata, CrawlerError>;

    /// How many identifiers one metadata request may carry
    fn max_batch_size(&self) -> usize {
        1
    }

    /// Build one metadata request covering several identifiers
    fn build_batch_metadata_request(&self, ids: &[String]) -> Result<ApiRequest, CrawlerError> {
        match ids {
            [id] => self.build_metadata_request(id),
            _ => Err(CrawlerError::InvalidRequest(format!(
                "{} does not support multi-id metadata requests",
                self.name()
            ))),
        }
    }

    /// Extract every item present in a multi-id metadata payload
    fn extract_batch_metadata(&self, payload: &Payload) -> Result<Vec<ItemMetadata>, CrawlerError> {
        let _ = payload;
        Err(CrawlerError::InvalidRequest(format!(
            "{} does not support multi-id metadata requests",
            self.name()
        )))
    }

    /// Validate that an identifier is well formed for this source
    fn validate_id(&self, id: &str) -> Result<(), CrawlerError> {
        if id.trim().is_empty() {
            return Err(CrawlerError::InvalidRequest("empty identifier".to_string()));
        }
        Ok(())
    }
}

/// Errors that can occur while crawling
#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    /// Timeout, connection reset, or other transport failure
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// HTTP 429
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Seconds from the `Retry-After` header, if any
        retry_after: Option<u64>,
    },

    /// HTTP 5xx
    #[error("Upstream server error (HTTP {status}): {message}")]
    UpstreamServer { status: u16, message: String },

    /// HTTP 4xx other than 429
    #[error("Upstream client error (HTTP {status}): {message}")]
    UpstreamClient { status: u16, message: String },

    /// Decode or shape mismatch
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Retry budget spent; wraps the last retryable cause
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<CrawlerError>,
    },

    /// The upstream reports no such identifier
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Invalid request parameters (bad date format, empty id)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration or session setup failure
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CrawlerError {
    /// Whether the retry policy should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlerError::TransientNetwork(_)
                | CrawlerError::RateLimited { .. }
                | CrawlerError::UpstreamServer { .. }
        )
    }

    /// Whether this error means the identifier does not exist upstream
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CrawlerError::ItemNotFound(_) | CrawlerError::UpstreamClient { status: 404, .. }
        )
    }
}

impl From<reqwest::Error> for CrawlerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrawlerError::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            CrawlerError::InvalidRequest(err.to_string())
        } else {
            CrawlerError::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CrawlerError {
    fn from(err: serde_json::Error) -> Self {
        CrawlerError::MalformedResponse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for CrawlerError {
    fn from(err: quick_xml::Error) -> Self {
        CrawlerError::MalformedResponse(format!("XML: {}", err))
    }
}

impl From<config::ConfigError> for CrawlerError {
    fn from(err: config::ConfigError) -> Self {
        CrawlerError::Config(err.to_string())
    }
}

impl From<url::ParseError> for CrawlerError {
    fn from(err: url::ParseError) -> Self {
        CrawlerError::Config(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CrawlerError::TransientNetwork("reset".into()).is_retryable());
        assert!(CrawlerError::RateLimited { retry_after: None }.is_retryable());
        assert!(CrawlerError::UpstreamServer {
            status: 503,
            message: String::new()
        }
        .is_retryable());

        assert!(!CrawlerError::UpstreamClient {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!CrawlerError::MalformedResponse("bad".into()).is_retryable());
        assert!(!CrawlerError::ItemNotFound("1".into()).is_retryable());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CrawlerError::ItemNotFound("1".into()).is_not_found());
        assert!(CrawlerError::UpstreamClient {
            status: 404,
            message: String::new()
        }
        .is_not_found());
        assert!(!CrawlerError::UpstreamClient {
            status: 403,
            message: String::new()
        }
        .is_not_found());
    }

    #[test]
    fn test_retry_exhausted_keeps_cause() {
        let err = CrawlerError::RetryExhausted {
            attempts: 4,
            last: Box::new(CrawlerError::UpstreamServer {
                status: 502,
                message: "bad gateway".into(),
            }),
        };
        let message = err.to_string();
        assert!(message.contains("4 attempts"));
        assert!(message.contains("502"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err: CrawlerError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, CrawlerError::MalformedResponse(_)));
    }
}
