//! The crawler engine.
//!
//! [`Crawler`] owns one transport (HTTP session, rate limiter, response cache)
//! and drives a [`SourceAdapter`] through paginated search, single-item
//! retrieval and batched retrieval. The session is opened when the crawler
//! is built and released when it is dropped or [closed](Crawler::close).

use async_stream::try_stream;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::CrawlerConfig;
use crate::models::{BatchFailure, BatchResult, ItemMetadata, SearchQuery};
use crate::sources::{CrawlerError, SourceAdapter};
use crate::utils::{CacheStats, HttpBackend, HttpClient, TransportClient};

#[cfg(feature = "source-clinical-trials")]
use crate::sources::ClinicalTrialsAdapter;
#[cfg(feature = "source-pubmed")]
use crate::sources::PubMedAdapter;

type ChunkOutcome = Vec<(String, Result<ItemMetadata, BatchFailure>)>;

/// Crawler for one provider
#[derive(Debug)]
pub struct Crawler<A: SourceAdapter> {
    adapter: A,
    config: Arc<CrawlerConfig>,
    transport: TransportClient,
}

#[cfg(feature = "source-pubmed")]
impl Crawler<PubMedAdapter> {
    /// Crawler for PubMed E-utilities
    pub fn pubmed(config: CrawlerConfig) -> Result<Self, CrawlerError> {
        let adapter = PubMedAdapter::from_config(&config);
        Self::new(adapter, config)
    }
}

#[cfg(feature = "source-clinical-trials")]
impl Crawler<ClinicalTrialsAdapter> {
    /// Crawler for the ClinicalTrials.gov v2 API
    pub fn clinical_trials(config: CrawlerConfig) -> Result<Self, CrawlerError> {
        Self::new(ClinicalTrialsAdapter::new(), config)
    }
}

impl<A: SourceAdapter> Crawler<A> {
    /// Validate `config` and open a pooled HTTP session
    pub fn new(adapter: A, config: CrawlerConfig) -> Result<Self, CrawlerError> {
        config.validate()?;
        let client = HttpClient::from_config(&config)?;
        Self::with_backend(adapter, config, Arc::new(client))
    }

    /// Build a crawler over an existing backend
    pub fn with_backend(
        adapter: A,
        config: CrawlerConfig,
        backend: Arc<dyn HttpBackend>,
    ) -> Result<Self, CrawlerError> {
        config.validate()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| adapter.default_base_url().to_string());
        let transport = TransportClient::new(&base_url, &config, backend)?;

        tracing::debug!("Created {} crawler for {}", adapter.name(), base_url);

        Ok(Self {
            adapter,
            config: Arc::new(config),
            transport,
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.transport.cache().stats()
    }

    pub fn clear_cache(&self) {
        self.transport.cache().clear();
    }

    /// Release the HTTP session
    ///
    /// Equivalent to dropping the crawler.
    pub fn close(self) {
        tracing::debug!("Closing {} crawler", self.adapter.name());
    }

    /// Stream identifiers matching `query`
    ///
    /// Pages are fetched on demand as the stream is polled. The stream ends
    /// when `max_results` identifiers have been yielded or the provider has
    /// no further pages; a failed page fetch ends it with that error.
    /// Dropping the stream cancels any in-flight request.
    pub fn search(
        &self,
        query: SearchQuery,
    ) -> impl Stream<Item = Result<String, CrawlerError>> + '_ {
        try_stream! {
            tracing::info!("Searching {} for '{}'", self.adapter.name(), query.query);

            let limit = query.max_results;
            let mut cursor = A::Cursor::default();
            let mut seen = HashSet::new();
            let mut yielded = 0usize;
            let mut pages = 0usize;

            'pages: while limit != Some(0) {
                let request = self.adapter.build_search_request(&query, &cursor)?;
                let payload = self.transport.fetch(&request).await?;
                let page = self.adapter.extract_ids(&payload, &cursor)?;
                pages += 1;

                let page_was_empty = page.ids.is_empty();
                for id in page.ids {
                    if query.exclude_ids.contains(&id) || !seen.insert(id.clone()) {
                        continue;
                    }

                    yield id;
                    yielded += 1;
                    if limit.is_some_and(|max| yielded >= max) {
                        break 'pages;
                    }
                }

                match page.next {
                    Some(next) if !page_was_empty => cursor = next,
                    _ => break,
                }
            }

            tracing::debug!(
                "Search for '{}' finished: {} ids from {} pages",
                query.query,
                yielded,
                pages
            );
        }
    }

    /// Fetch metadata for one identifier
    pub async fn get_item(&self, id: &str) -> Result<ItemMetadata, CrawlerError> {
        self.adapter.validate_id(id)?;
        let request = self.adapter.build_metadata_request(id)?;
        let payload = self
            .transport
            .fetch(&request)
            .await
            .map_err(|err| not_found_as(id, err))?;
        self.adapter.extract_metadata(id, &payload)
    }

    /// Fetch metadata for many identifiers
    ///
    /// Duplicate ids are fetched once. Ids are grouped into chunks of the
    /// adapter's batch size and at most `batch_concurrency` chunks are in
    /// flight at a time. Failures are collected per id and never abort the
    /// rest of the batch.
    pub async fn get_items_batch<I, S>(&self, ids: I) -> BatchResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = BatchResult::default();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut pending = Vec::new();

        for id in ids {
            let id = id.into();
            if position.contains_key(&id) {
                continue;
            }
            position.insert(id.clone(), position.len());

            match self.adapter.validate_id(&id) {
                Ok(()) => pending.push(id),
                Err(err) => result.failures.push(BatchFailure::from_error(id, &err)),
            }
        }

        let chunk_size = self.adapter.max_batch_size().max(1);
        let chunks: Vec<Vec<String>> = pending.chunks(chunk_size).map(<[String]>::to_vec).collect();
        tracing::info!(
            "Fetching {} {} items in {} chunks",
            pending.len(),
            self.adapter.name(),
            chunks.len()
        );

        let mut outcomes = stream::iter(chunks)
            .map(|chunk| self.fetch_chunk(chunk))
            .buffer_unordered(self.config.batch_concurrency);

        while let Some(outcome) = outcomes.next().await {
            for (id, fetched) in outcome {
                match fetched {
                    Ok(item) => {
                        result.items.insert(id, item);
                    }
                    Err(failure) => {
                        tracing::error!("Failed to fetch {}: {}", id, failure.reason);
                        result.failures.push(failure);
                    }
                }
            }
        }

        result
            .failures
            .sort_by_key(|failure| position.get(&failure.id).copied().unwrap_or(usize::MAX));

        tracing::info!(
            "Batch complete: {} of {} items fetched, {} failed",
            result.items.len(),
            position.len(),
            result.failures.len()
        );
        result
    }

    async fn fetch_chunk(&self, ids: Vec<String>) -> ChunkOutcome {
        if let [id] = ids.as_slice() {
            let fetched = self.get_item(id).await;
            return vec![(id.clone(), fetched.map_err(|err| BatchFailure::from_error(id.as_str(), &err)))];
        }

        match self.fetch_many(&ids).await {
            Ok(mut found) => ids
                .into_iter()
                .map(|id| {
                    let fetched = found.remove(&id).ok_or_else(|| {
                        BatchFailure::from_error(id.as_str(), &CrawlerError::ItemNotFound(id.clone()))
                    });
                    (id, fetched)
                })
                .collect(),
            Err(err) => {
                tracing::warn!("Chunk of {} ids failed: {}", ids.len(), err);
                ids.into_iter()
                    .map(|id| {
                        let failure = BatchFailure::from_error(id.as_str(), &err);
                        (id, Err(failure))
                    })
                    .collect()
            }
        }
    }

    async fn fetch_many(&self, ids: &[String]) -> Result<HashMap<String, ItemMetadata>, CrawlerError> {
        let request = self.adapter.build_batch_metadata_request(ids)?;
        let payload = self.transport.fetch(&request).await?;
        let items = self.adapter.extract_batch_metadata(&payload)?;
        Ok(items.into_iter().map(|item| (item.id.clone(), item)).collect())
    }
}

/// Map an upstream 404 to `ItemNotFound` for `id`
fn not_found_as(id: &str, err: CrawlerError) -> CrawlerError {
    match err {
        CrawlerError::UpstreamClient { status: 404, .. } => CrawlerError::ItemNotFound(id.to_string()),
        other => other,
    }
}
