//! Item metadata model shared by every provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The provider an item was retrieved from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[serde(rename = "pubmed")]
    PubMed,
    ClinicalTrials,
    #[serde(untagged)]
    Other(String),
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            SourceType::PubMed => "PubMed",
            SourceType::ClinicalTrials => "ClinicalTrials.gov",
            SourceType::Other(s) => s,
        }
    }

    /// Returns the source identifier
    pub fn id(&self) -> &str {
        match self {
            SourceType::PubMed => "pubmed",
            SourceType::ClinicalTrials => "clinical_trials",
            SourceType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Metadata for a single item (article or trial)
///
/// The shape is the same for every provider, so callers never branch on the
/// source. Provider-specific fields live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Source-specific identifier (PMID, NCT ID)
    pub id: String,

    /// Title
    pub title: String,

    /// Authors or responsible investigators, in source order
    #[serde(default)]
    pub authors: Vec<String>,

    /// Abstract or brief summary
    #[serde(default, rename = "abstract")]
    pub r#abstract: String,

    /// Publication or registration date, as reported by the source
    #[serde(default)]
    pub date: Option<String>,

    /// Source the item came from
    pub source: SourceType,

    /// Source-specific metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ItemMetadata {
    /// Create a new item with required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: SourceType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            r#abstract: String::new(),
            date: None,
            source,
            extra: Map::new(),
        }
    }

    /// Look up a source-specific field
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Builder for constructing ItemMetadata objects
#[derive(Debug, Clone)]
pub struct ItemMetadataBuilder {
    item: ItemMetadata,
}

impl ItemMetadataBuilder {
    /// Create a new builder with required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: SourceType) -> Self {
        Self {
            item: ItemMetadata::new(id, title, source),
        }
    }

    /// Set authors
    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.item.authors = authors;
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.item.r#abstract = abstract_text.into();
        self
    }

    /// Set date, ignoring empty values
    pub fn date(mut self, date: Option<String>) -> Self {
        self.item.date = date.filter(|d| !d.is_empty());
        self
    }

    /// Add extra metadata, skipping nulls
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.item.extra.insert(key.into(), value);
        }
        self
    }

    /// Build the ItemMetadata
    pub fn build(self) -> ItemMetadata {
        self.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builder() {
        let item = ItemMetadataBuilder::new("12345", "Test Article", SourceType::PubMed)
            .authors(vec!["Jane Doe".to_string(), "John Smith".to_string()])
            .abstract_text("An abstract.")
            .date(Some("2023/05/01".to_string()))
            .extra("doi", "10.1000/test")
            .extra("journal", Value::Null)
            .build();

        assert_eq!(item.id, "12345");
        assert_eq!(item.authors, vec!["Jane Doe", "John Smith"]);
        assert_eq!(item.date.as_deref(), Some("2023/05/01"));
        assert_eq!(item.extra_str("doi"), Some("10.1000/test"));
        assert!(!item.extra.contains_key("journal"));
    }

    #[test]
    fn test_empty_date_is_none() {
        let item = ItemMetadataBuilder::new("NCT1", "Trial", SourceType::ClinicalTrials)
            .date(Some(String::new()))
            .build();
        assert!(item.date.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let item = ItemMetadataBuilder::new("NCT00000001", "Trial", SourceType::ClinicalTrials)
            .abstract_text("Summary")
            .build();
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["id"], "NCT00000001");
        assert_eq!(json["abstract"], "Summary");
        assert_eq!(json["source"], "clinical_trials");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn test_source_type_names() {
        assert_eq!(SourceType::PubMed.id(), "pubmed");
        assert_eq!(SourceType::ClinicalTrials.to_string(), "ClinicalTrials.gov");
        assert_eq!(SourceType::Other("mock".into()).id(), "mock");
    }
}
