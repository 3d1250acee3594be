//! SerpAPI Client
//!
//! Web search via SerpAPI's `google_light` engine: fast, general-purpose
//! results with title, link, and snippet — the raw material of a research
//! round. Calls are throttled through a shared rate limiter so every
//! concurrent run draws from the same provider quota.

use crate::config::SearchConfig;
use crate::engine::{SearchExecutor, SearchFailure, SearchHit};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use std::num::NonZeroU32;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("SerpAPI key not configured")]
    NoApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),
}

/// SerpAPI client for general web search
pub struct SerpApiClient {
    api_key: String,
    max_results: usize,
    limiter: DefaultDirectRateLimiter,
}

impl SerpApiClient {
    /// Create a new SerpAPI client
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            max_results: 5,
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(4).unwrap_or(NonZeroU32::MIN),
            )),
        }
    }

    /// Configure client from config; `None` when no API key is set.
    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key: config.serpapi_key.clone(),
            max_results: config.max_results,
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(config.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN),
            )),
        })
    }

    /// Set maximum results per search
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Run one web search and return parsed hits.
    pub async fn search_web(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        self.limiter.until_ready().await;

        info!(query = %query, "Searching the web via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), "google_light".to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("gl".to_string(), "us".to_string());
        params.insert("num".to_string(), self.max_results.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());

        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!("Raw search response received");

        let hits = parse_organic_results(&results, self.max_results)?;
        info!(count = hits.len(), "Web search completed");
        Ok(hits)
    }
}

/// Pull `{title, link, snippet}` hits out of a SerpAPI response. A missing
/// `organic_results` key is an empty result set, not an error.
fn parse_organic_results(
    results: &serde_json::Value,
    max_results: usize,
) -> Result<Vec<SearchHit>, SearchError> {
    let organic_results = match results.get("organic_results") {
        Some(value) => value,
        None => return Ok(Vec::new()),
    };

    let results_array = organic_results
        .as_array()
        .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string()))?;

    let mut hits = Vec::new();
    for result in results_array.iter().take(max_results) {
        let title = result
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled")
            .to_string();

        let snippet = result
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let url = result
            .get("link")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if url.is_empty() {
            continue;
        }

        hits.push(SearchHit {
            url,
            title,
            snippet,
        });
    }

    Ok(hits)
}

#[async_trait]
impl SearchExecutor for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchFailure> {
        self.search_web(query)
            .await
            .map_err(|e| SearchFailure::Unavailable(e.to_string()))
    }
}
