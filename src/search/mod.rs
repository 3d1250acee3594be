//! Search Module
//!
//! Web search for the research loop, backed by SerpAPI's general web
//! engine. The client is rate limited so concurrent runs share the
//! provider quota safely.

pub mod serpapi;

pub use serpapi::{SearchError, SerpApiClient};

use crate::engine::{SearchExecutor, SearchFailure, SearchHit};
use async_trait::async_trait;

/// Stand-in executor used when no search API key is configured. Every
/// search reports unavailable, which the engine absorbs as a per-query
/// miss.
pub struct DisabledSearch;

#[async_trait]
impl SearchExecutor for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchFailure> {
        Err(SearchFailure::Unavailable(
            "no search API key configured".to_string(),
        ))
    }
}
