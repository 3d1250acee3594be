//! Run state for a single research run.
//!
//! One `RunState` exists per accepted request. It aggregates the queries
//! issued per round, the deduplicated source set, and the reflection notes,
//! and it is dropped as soon as the terminal result has been produced.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// A validated research request as accepted by the engine.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub topic: String,
    pub max_loops: u32,
    pub initial_query_count: usize,
}

/// A search query issued in a specific round. Never mutated once recorded.
#[derive(Debug, Clone, Serialize)]
pub struct SearchQuery {
    pub text: String,
    pub round: u32,
}

/// One raw search hit as returned by a search capability.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// A deduplicated external reference contributing evidence to the answer.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// Stable short identifier, unique within the run, e.g. `[example.com-a1b2c3]`.
    pub id: String,
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Gap,
    Confirmation,
}

/// Advisory reflection output. Informs the continue/stop decision but never
/// blocks progress.
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionNote {
    pub text: String,
    pub round: u32,
    pub kind: NoteKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generating,
    Searching,
    Reflecting,
    Synthesizing,
    Completed,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Generating => write!(f, "generating"),
            Phase::Searching => write!(f, "searching"),
            Phase::Reflecting => write!(f, "reflecting"),
            Phase::Synthesizing => write!(f, "synthesizing"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal output of a research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchResult {
    /// Markdown answer; citation markers reference `Source::id` values.
    pub answer: String,
    pub sources: Vec<Source>,
    /// Rounds actually executed.
    pub iterations: u32,
    pub status: RunStatus,
}

impl ResearchResult {
    /// A failed result with nothing gathered. Emitted when a run dies
    /// before any source could be collected.
    pub fn empty_failed() -> Self {
        Self {
            answer: String::new(),
            sources: Vec::new(),
            iterations: 0,
            status: RunStatus::Failed,
        }
    }
}

/// The orchestrator's mutable aggregate for one run.
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    pub round: u32,
    pub phase: Phase,
    queries: Vec<SearchQuery>,
    sources: Vec<Source>,
    /// Normalized URL -> index into `sources`.
    index: HashMap<String, usize>,
    /// Normalized URL -> number of times the URL was seen again after the
    /// first capture. Reinforcement is advisory input for reflection.
    reinforced: HashMap<String, u32>,
    pub notes: Vec<ReflectionNote>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            round: 0,
            phase: Phase::Generating,
            queries: Vec::new(),
            sources: Vec::new(),
            index: HashMap::new(),
            reinforced: HashMap::new(),
            notes: Vec::new(),
        }
    }

    /// Record the query set of a round.
    pub fn record_queries(&mut self, round: u32, texts: &[String]) {
        for text in texts {
            self.queries.push(SearchQuery {
                text: text.clone(),
                round,
            });
        }
    }

    /// All query texts issued so far, across every round.
    pub fn prior_query_texts(&self) -> Vec<String> {
        self.queries.iter().map(|q| q.text.clone()).collect()
    }

    /// Has `text` been issued in any round? Comparison is case-insensitive
    /// on trimmed text.
    pub fn has_query(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        self.queries
            .iter()
            .any(|q| q.text.trim().to_lowercase() == needle)
    }

    /// Merge search hits into the source set, deduplicating by normalized
    /// URL. The first-seen title and snippet win; a re-seen URL is counted
    /// as reinforcing. Returns the number of sources that were new.
    pub fn merge_hits(&mut self, hits: Vec<SearchHit>) -> usize {
        let mut added = 0;

        for hit in hits {
            let key = normalize_url(&hit.url);
            if self.index.contains_key(&key) {
                *self.reinforced.entry(key).or_insert(0) += 1;
                continue;
            }

            let source = Source {
                id: short_source_id(&key),
                url: hit.url,
                title: hit.title,
                snippet: hit.snippet,
            };
            self.index.insert(key, self.sources.len());
            self.sources.push(source);
            added += 1;
        }

        added
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// How many times the source behind `url` was reinforced by later hits.
    pub fn reinforcement(&self, url: &str) -> u32 {
        self.reinforced
            .get(&normalize_url(url))
            .copied()
            .unwrap_or(0)
    }

    /// Hand the accumulated sources to the terminal result, consuming the
    /// state.
    pub fn into_sources(self) -> Vec<Source> {
        self.sources
    }
}

/// Normalize a URL for deduplication: lowercase scheme and host, drop the
/// fragment and default port, strip a single trailing slash from the path.
/// The query string is kept, since it routinely distinguishes documents.
/// Unparseable input falls back to trimmed lowercase.
pub fn normalize_url(raw: &str) -> String {
    let parsed = match url::Url::parse(raw.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return raw.trim().to_lowercase(),
    };

    let mut normalized = format!("{}://", parsed.scheme());
    if let Some(host) = parsed.host_str() {
        normalized.push_str(&host.to_lowercase());
    }
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{}", port));
    }

    let path = parsed.path();
    let path = if path.len() > 1 && path.ends_with('/') {
        &path[..path.len() - 1]
    } else if path == "/" {
        ""
    } else {
        path
    };
    normalized.push_str(path);

    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }

    normalized
}

/// Build the short citation identifier for a normalized URL:
/// `[domain-hash6]`, where the hash pins the identifier to the exact URL.
pub fn short_source_id(normalized_url: &str) -> String {
    let domain = url::Url::parse(normalized_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "source".to_string());

    let digest = Sha256::digest(normalized_url.as_bytes());
    let hash = hex::encode(&digest[..3]);

    format!("[{}-{}]", domain, hash)
}
