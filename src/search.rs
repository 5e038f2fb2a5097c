//! Web search client for recent news.
//!
//! Queries an external web-search API with a freshness window and strips
//! each result to title/url/truncated-description to bound the payload the
//! downstream script stage has to carry.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::SearchError;
use crate::jobs::NewsItem;

/// Maximum bytes kept of a result description.
pub const DESCRIPTION_LIMIT: usize = 280;

/// Default search API base URL.
const DEFAULT_API_BASE: &str = "https://api.search.brave.com";

/// Default freshness window (past week).
const DEFAULT_FRESHNESS: &str = "pw";

/// Provider of recent news results.
#[async_trait]
pub trait NewsSearch: Send + Sync {
    /// Returns up to `count` fresh results for a free-text query.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<NewsItem>, SearchError>;
}

/// Client for a Brave-compatible web search API.
pub struct WebSearchClient {
    api_base: String,
    api_key: String,
    freshness: String,
    http_client: Client,
}

impl WebSearchClient {
    /// Creates a new search client with explicit configuration.
    pub fn new(api_base: String, api_key: String, freshness: String) -> Self {
        Self {
            api_base,
            api_key,
            freshness,
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a search client from environment variables.
    ///
    /// Reads:
    /// - `SEARCH_API_KEY`: subscription token (required)
    /// - `SEARCH_API_BASE`: API base URL (default: Brave search endpoint)
    /// - `SEARCH_FRESHNESS`: freshness window code (default: "pw")
    pub fn from_env() -> Result<Self, SearchError> {
        let api_key = env::var("SEARCH_API_KEY").map_err(|_| SearchError::MissingApiKey)?;
        let api_base = env::var("SEARCH_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let freshness = env::var("SEARCH_FRESHNESS").unwrap_or_else(|_| DEFAULT_FRESHNESS.to_string());

        Ok(Self::new(api_base, api_key, freshness))
    }
}

#[async_trait]
impl NewsSearch for WebSearchClient {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<NewsItem>, SearchError> {
        let url = format!("{}/res/v1/web/search", self.api_base);

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("freshness", self.freshness.clone()),
                ("count", count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(SearchError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body: ApiSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let results = body
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(count)
            .map(|result| NewsItem {
                title: result.title,
                url: result.url,
                description: truncate_to(&result.description.unwrap_or_default(), DESCRIPTION_LIMIT),
            })
            .collect();

        Ok(results)
    }
}

/// Search API response shape: `{"web": {"results": [...]}}`.
#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    web: Option<ApiWebResults>,
}

#[derive(Debug, Deserialize)]
struct ApiWebResults {
    #[serde(default)]
    results: Vec<ApiSearchResult>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

/// Truncates a string to at most `max_bytes`, respecting char boundaries.
pub fn truncate_to(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
