//! # MedCrawler
//!
//! An asynchronous, rate-limited crawler for medical literature APIs.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (ItemMetadata, SearchQuery, BatchResult)
//! - [`sources`]: Provider adapters (PubMed, ClinicalTrials.gov) and the [`SourceAdapter`] trait
//! - [`crawler`]: The [`Crawler`] engine that drives search, item and batch retrieval
//! - [`utils`]: HTTP session, rate limiting, retry, response cache and transport
//! - [`config`]: Configuration management
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures_util::{pin_mut, StreamExt};
//! use medcrawler::{Crawler, CrawlerConfig, SearchQuery};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), medcrawler::CrawlerError> {
//! let crawler = Crawler::pubmed(CrawlerConfig::default())?;
//!
//! let ids = crawler.search(SearchQuery::new("diabetes").max_results(5));
//! pin_mut!(ids);
//! while let Some(id) = ids.next().await {
//!     let item = crawler.get_item(&id?).await?;
//!     println!("{}: {}", item.id, item.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crawler;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use config::CrawlerConfig;
pub use crawler::Crawler;
pub use models::{BatchFailure, BatchResult, ItemMetadata, SearchQuery, SourceType};
pub use sources::{CrawlerError, SourceAdapter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
