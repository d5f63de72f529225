//! Mock source adapter for testing.
//!
//! Speaks a minimal JSON protocol, so engine behavior can be exercised
//! against a [`MockBackend`](crate::utils::MockBackend) without provider quirks:
//!
//! - `search?q=..&page=N[&from=..][&to=..]` → `{"ids": [...], "next": N | null}`
//! - `items/{id}` → `{"id": .., "title": .., "authors": [..], "abstract": ..}`
//! - `items?ids=a,b` → `{"items": [<item>, ...]}`

use serde::Deserialize;

use super::{CrawlerError, Page, SourceAdapter};
use crate::models::{ItemMetadata, ItemMetadataBuilder, SearchQuery, SourceType};
use crate::utils::{ApiRequest, Payload};

/// Mock adapter for testing
#[derive(Debug, Clone)]
pub struct MockAdapter {
    batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    ids: Vec<serde_json::Value>,
    next: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MockItem {
    id: String,
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    items: Vec<MockItem>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self { batch_size: 1 }
    }

    /// Accept up to `size` ids per metadata request
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    fn to_metadata(item: MockItem) -> ItemMetadata {
        ItemMetadataBuilder::new(item.id, item.title, SourceType::Other("mock".to_string()))
            .authors(item.authors)
            .abstract_text(item.abstract_text)
            .date(item.date)
            .build()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for MockAdapter {
    type Cursor = usize;

    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Other("mock".to_string())
    }

    fn default_base_url(&self) -> &str {
        "http://mock.test/"
    }

    fn build_search_request(
        &self,
        query: &SearchQuery,
        cursor: &usize,
    ) -> Result<ApiRequest, CrawlerError> {
        Ok(ApiRequest::json("search")
            .param("q", &query.query)
            .param("page", cursor)
            .param_opt("from", query.from_date.as_deref())
            .param_opt("to", query.to_date.as_deref()))
    }

    fn extract_ids(&self, payload: &Payload, _cursor: &usize) -> Result<Page<usize>, CrawlerError> {
        let page: SearchPage = serde_json::from_value(payload.as_json()?.clone())?;
        let ids = page
            .ids
            .into_iter()
            .map(|id| match id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        Ok(Page {
            ids,
            next: page.next,
        })
    }

    fn build_metadata_request(&self, id: &str) -> Result<ApiRequest, CrawlerError> {
        Ok(ApiRequest::json(format!("items/{}", id)))
    }

    fn extract_metadata(&self, id: &str, payload: &Payload) -> Result<ItemMetadata, CrawlerError> {
        let item: MockItem = serde_json::from_value(payload.as_json()?.clone())?;
        if item.id != id {
            return Err(CrawlerError::ItemNotFound(id.to_string()));
        }
        Ok(Self::to_metadata(item))
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn build_batch_metadata_request(&self, ids: &[String]) -> Result<ApiRequest, CrawlerError> {
        Ok(ApiRequest::json("items").param("ids", ids.join(",")))
    }

    fn extract_batch_metadata(&self, payload: &Payload) -> Result<Vec<ItemMetadata>, CrawlerError> {
        let list: ItemList = serde_json::from_value(payload.as_json()?.clone())?;
        Ok(list.items.into_iter().map(Self::to_metadata).collect())
    }
}
