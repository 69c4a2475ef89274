//! Search Service
//!
//! Trait seams for the remote convention search service and for cover
//! image downloads. [`HttpSearchBackend`] implements both over HTTP.
//!
//! # Response Envelope
//!
//! The service answers `{ "code": 200, "data": [...] }`. A non-200 `code`
//! or a missing/empty `data` array means "no results", which is distinct
//! from a transport failure (see [`SearchError`]).

mod http;

pub use http::{HttpSearchBackend, COVER_REFERER, DEFAULT_API_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventRecord;

/// `code` value of a successful response
pub const CODE_OK: i64 = 200;

/// Search failures. "No results" is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Request could not be sent or completed
    #[error("search request failed: {0}")]
    Transport(String),

    /// Server answered with an HTTP error status
    #[error("search service returned HTTP {0}")]
    Status(u16),

    /// Body was not the expected envelope
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

/// Response envelope of the search service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub data: Option<Vec<EventRecord>>,
}

impl SearchResponse {
    /// Successful envelope carrying `records`
    #[must_use]
    pub fn ok(records: Vec<EventRecord>) -> Self {
        Self {
            code: CODE_OK,
            data: Some(records),
        }
    }

    /// Records of a successful response; empty for any other code
    #[must_use]
    pub fn into_records(self) -> Vec<EventRecord> {
        if self.code != CODE_OK {
            return Vec::new();
        }
        self.data.unwrap_or_default()
    }
}

/// Keyword lookup against the search service
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Look up `keyword`
    async fn search(&self, keyword: &str) -> Result<SearchResponse, SearchError>;
}

/// Source of cover image bytes
#[async_trait]
pub trait CoverSource: Send + Sync {
    /// Download a cover. Any failure yields `None`.
    async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_200_means_no_results() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"code": 404, "data": [{"name": "x"}]}"#).unwrap();
        assert!(response.into_records().is_empty());
    }

    #[test]
    fn test_null_data_means_no_results() {
        let response: SearchResponse = serde_json::from_str(r#"{"code": 200, "data": null}"#).unwrap();
        assert!(response.into_records().is_empty());

        let response: SearchResponse = serde_json::from_str(r#"{"code": 200}"#).unwrap();
        assert!(response.into_records().is_empty());
    }

    #[test]
    fn test_records_pass_through() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"code": 200, "data": [{"name": "A"}, {"name": "B", "address": "南京"}]}"#,
        )
        .unwrap();
        let records = response.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].address, "南京");
    }
}
