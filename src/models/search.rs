//! Search request and batch result models.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::ItemMetadata;
use crate::sources::CrawlerError;

/// Search query parameters
///
/// Date filters are passed to the source adapter verbatim; each adapter
/// validates them against its provider's format (`YYYY/MM/DD` for PubMed,
/// `YYYY-MM-DD` for ClinicalTrials.gov).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Main search query string
    pub query: String,

    /// Maximum number of identifiers to yield (`None` means until exhaustion)
    pub max_results: Option<usize>,

    /// Identifiers that must not be yielded
    #[serde(default)]
    pub exclude_ids: HashSet<String>,

    /// Lower date bound
    pub from_date: Option<String>,

    /// Upper date bound
    pub to_date: Option<String>,
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set maximum results
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Exclude previously seen identifiers
    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set the lower date bound
    pub fn from_date(mut self, date: impl Into<String>) -> Self {
        self.from_date = Some(date.into());
        self
    }

    /// Set the upper date bound
    pub fn to_date(mut self, date: impl Into<String>) -> Self {
        self.to_date = Some(date.into());
        self
    }

    /// Whether any date filter is set
    pub fn has_date_filter(&self) -> bool {
        self.from_date.is_some() || self.to_date.is_some()
    }
}

/// An identifier that could not be fetched in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// The identifier that failed
    pub id: String,

    /// Human-readable failure reason
    pub reason: String,

    /// Whether the failure was a not-found condition
    pub not_found: bool,
}

impl BatchFailure {
    /// Record `error` as the failure for `id`
    pub fn from_error(id: impl Into<String>, error: &CrawlerError) -> Self {
        Self {
            id: id.into(),
            reason: error.to_string(),
            not_found: error.is_not_found(),
        }
    }
}

/// Outcome of a batch metadata fetch
///
/// Successful items are keyed by identifier; failures are reported
/// separately and never abort the rest of the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    /// Successfully fetched items
    pub items: HashMap<String, ItemMetadata>,

    /// Identifiers that failed, with reasons
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    /// Whether every requested identifier succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Identifiers that failed
    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("diabetes")
            .max_results(5)
            .exclude(["1", "2"])
            .from_date("2020/01/01");

        assert_eq!(query.query, "diabetes");
        assert_eq!(query.max_results, Some(5));
        assert!(query.exclude_ids.contains("1"));
        assert!(query.exclude_ids.contains("2"));
        assert!(query.has_date_filter());
        assert!(query.to_date.is_none());
    }

    #[test]
    fn test_default_query_is_unbounded() {
        let query = SearchQuery::new("cancer");
        assert!(query.max_results.is_none());
        assert!(query.exclude_ids.is_empty());
        assert!(!query.has_date_filter());
    }

    #[test]
    fn test_batch_result_failures() {
        let mut result = BatchResult::default();
        assert!(result.is_complete());

        result.failures.push(BatchFailure::from_error(
            "b",
            &CrawlerError::ItemNotFound("b".to_string()),
        ));
        assert!(!result.is_complete());
        assert!(result.failures[0].not_found);
        assert_eq!(result.failures[0].reason, "Item not found: b");
        assert_eq!(result.failed_ids().collect::<Vec<_>>(), vec!["b"]);
    }
}
