//! Core data models for crawled items and search operations.

mod item;
mod search;

pub use item::{ItemMetadata, ItemMetadataBuilder, SourceType};
pub use search::{BatchFailure, BatchResult, SearchQuery};
