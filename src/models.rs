use crate::config::{Config, ResearchConfig};
use crate::engine::{ResearchEngine, ResearchRequest, ResearchResult, Source};
use std::sync::Arc;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ResearchEngine>,
}

/// Wire request accepted by the research endpoints. The loop and query
/// counts are optional; omitted values fall back to the configured
/// defaults.
#[derive(Debug, Clone, serde::Deserialize, Validate)]
pub struct ResearchApiRequest {
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
    #[validate(range(min = 1, message = "max_research_loops must be at least 1"))]
    pub max_research_loops: Option<u32>,
    #[validate(range(min = 1, message = "initial_search_query_count must be at least 1"))]
    pub initial_search_query_count: Option<usize>,
}

impl ResearchApiRequest {
    pub fn into_engine_request(self, defaults: &ResearchConfig) -> ResearchRequest {
        ResearchRequest {
            topic: self.query,
            max_loops: self
                .max_research_loops
                .unwrap_or(defaults.default_max_loops),
            initial_query_count: self
                .initial_search_query_count
                .unwrap_or(defaults.default_initial_queries),
        }
    }
}

/// One source as rendered on the wire: full URL, short citation
/// identifier, and title.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceEntry {
    pub value: String,
    pub short_url: String,
    pub title: String,
}

impl From<&Source> for SourceEntry {
    fn from(source: &Source) -> Self {
        Self {
            value: source.url.clone(),
            short_url: source.id.clone(),
            title: source.title.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ResearchApiResponse {
    pub answer: String,
    pub sources: Vec<SourceEntry>,
    pub iterations: u32,
    pub status: String,
}

impl From<ResearchResult> for ResearchApiResponse {
    fn from(result: ResearchResult) -> Self {
        Self {
            answer: result.answer,
            sources: result.sources.iter().map(SourceEntry::from).collect(),
            iterations: result.iterations,
            status: result.status.to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
