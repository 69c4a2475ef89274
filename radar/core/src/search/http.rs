//! HTTP Search Backend
//!
//! `GET {api_url}?msg=<keyword>` against the search service, plus cover
//! downloads with the referer the image host expects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;

use super::{CoverSource, SearchBackend, SearchError, SearchResponse};

/// Public search endpoint
pub const DEFAULT_API_URL: &str = "http://xwl.vincentzyu233.cn:51225/search";

/// Referer sent with cover downloads
pub const COVER_REFERER: &str = "https://cp.allcpp.cn/";

/// Search service client
#[derive(Clone, Debug)]
pub struct HttpSearchBackend {
    /// Search endpoint
    api_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpSearchBackend {
    /// Create a backend for `api_url` with a per-request timeout
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Client(e.to_string()))?;

        Ok(Self {
            api_url: api_url.into(),
            http_client,
        })
    }

    /// Search endpoint in use
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, keyword: &str) -> Result<SearchResponse, SearchError> {
        tracing::debug!(url = %self.api_url, keyword, "Searching");

        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[("msg", keyword)])
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        tracing::debug!(
            keyword,
            code = body.code,
            results = body.data.as_ref().map_or(0, Vec::len),
            "Search finished"
        );
        Ok(body)
    }
}

#[async_trait]
impl CoverSource for HttpSearchBackend {
    async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self
            .http_client
            .get(url)
            .header(REFERER, COVER_REFERER)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url, error = %e, "Cover download failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Cover download rejected");
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                tracing::debug!(url, error = %e, "Cover body unreadable");
                None
            }
        }
    }
}
