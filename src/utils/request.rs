//! Request description and decoded payloads.

use serde_json::Value;

use super::Fingerprint;
use crate::sources::CrawlerError;

/// How an endpoint encodes its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
}

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Xml(String),
}

impl Payload {
    /// Decode a raw body according to the endpoint's declared format
    pub fn decode(format: ResponseFormat, body: String) -> Result<Self, CrawlerError> {
        match format {
            ResponseFormat::Json => Ok(Payload::Json(serde_json::from_str(&body)?)),
            ResponseFormat::Xml => {
                if body.trim_start().starts_with('<') {
                    Ok(Payload::Xml(body))
                } else {
                    Err(CrawlerError::MalformedResponse(
                        "expected an XML document".to_string(),
                    ))
                }
            }
        }
    }

    /// Borrow the JSON value, or fail if this is not a JSON payload
    pub fn as_json(&self) -> Result<&Value, CrawlerError> {
        match self {
            Payload::Json(value) => Ok(value),
            Payload::Xml(_) => Err(CrawlerError::MalformedResponse(
                "expected JSON, got XML".to_string(),
            )),
        }
    }

    /// Borrow the XML text, or fail if this is not an XML payload
    pub fn as_xml(&self) -> Result<&str, CrawlerError> {
        match self {
            Payload::Xml(text) => Ok(text),
            Payload::Json(_) => Err(CrawlerError::MalformedResponse(
                "expected XML, got JSON".to_string(),
            )),
        }
    }
}

/// One GET request against a provider endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Endpoint path relative to the provider base URL
    pub endpoint: String,

    /// Query parameters, in insertion order
    pub params: Vec<(String, String)>,

    /// Declared response encoding
    pub format: ResponseFormat,
}

impl ApiRequest {
    /// A request for a JSON endpoint
    pub fn json(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            format: ResponseFormat::Json,
        }
    }

    /// A request for an XML endpoint
    pub fn xml(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            format: ResponseFormat::Xml,
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when a value is present
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// First value of a query parameter
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Cache key for this request
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.endpoint, &self.params)
    }
}
