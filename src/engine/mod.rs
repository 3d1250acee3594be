//! Research engine
//!
//! The core of the service: a bounded generate→search→reflect loop that
//! finishes with cited answer synthesis. The four capabilities the loop
//! drives sit behind narrow async traits so the engine can run against
//! LLM-backed implementations in production and deterministic stubs in
//! tests.
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │   Query    │ → │   Search   │ → │ Reflection │ ─┐
//! │ Generator  │   │  Executor  │   │ Evaluator  │  │ loop ≤ max_loops
//! └────────────┘   └────────────┘   └────────────┘  │
//!        ▲                                          │
//!        └──────────────── follow-ups ──────────────┘
//!                                │ stop
//!                                ▼
//!                        ┌────────────┐
//!                        │   Answer   │
//!                        │Synthesizer │
//!                        └────────────┘
//! ```

pub mod events;
pub mod orchestrator;
pub mod state;

pub use events::{EventSink, ProgressEvent};
pub use orchestrator::{EngineLimits, ResearchEngine};
pub use state::{
    NoteKind, Phase, ReflectionNote, ResearchRequest, ResearchResult, RunStatus, SearchHit, Source,
};

use async_trait::async_trait;
use thiserror::Error;

/// The query-generation capability is unreachable or produced nothing
/// usable. Fatal only when it happens before any queries exist.
#[derive(Debug, Error)]
#[error("query generation unavailable: {0}")]
pub struct GenerationUnavailable(pub String);

/// Failure of a single search call. Never fatal to a run.
#[derive(Debug, Error)]
pub enum SearchFailure {
    #[error("search unavailable: {0}")]
    Unavailable(String),
    #[error("search timed out")]
    Timeout,
}

/// The reflection capability failed. Reflection is advisory, so the
/// orchestrator absorbs this entirely.
#[derive(Debug, Error)]
#[error("reflection unavailable: {0}")]
pub struct ReflectionUnavailable(pub String);

/// Answer synthesis failed. `partial` carries whatever answer text was
/// produced before the failure, possibly empty.
#[derive(Debug, Error)]
#[error("answer synthesis unavailable: {reason}")]
pub struct SynthesisUnavailable {
    pub reason: String,
    pub partial: String,
}

/// Terminal errors of a research run. Everything else is absorbed into the
/// terminal `ResearchResult`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Generation(#[from] GenerationUnavailable),

    #[error("run cancelled")]
    Cancelled,
}

/// Output of one reflection pass.
#[derive(Debug, Clone)]
pub struct Reflection {
    /// Does the evidence suffice to answer the topic?
    pub sufficient: bool,
    /// Proposed queries for the next round. Advisory; the orchestrator
    /// deduplicates and caps them.
    pub follow_up_queries: Vec<String>,
    pub notes: Vec<ReflectionNote>,
}

impl Reflection {
    /// The neutral reflection used when the capability fails: not
    /// sufficient, nothing to follow up, no notes.
    pub fn inconclusive() -> Self {
        Self {
            sufficient: false,
            follow_up_queries: Vec::new(),
            notes: Vec::new(),
        }
    }
}

/// Produces distinct search queries for a topic.
///
/// Implementations must not return any string equal (case-insensitive,
/// trimmed) to an entry of `prior_queries`, and must return at most
/// `count` queries.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(
        &self,
        topic: &str,
        count: usize,
        prior_queries: &[String],
    ) -> Result<Vec<String>, GenerationUnavailable>;
}

/// Executes one web search and returns sourced hits.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchFailure>;
}

/// Judges evidence sufficiency and proposes follow-ups. Purely advisory:
/// the orchestrator alone decides when the loop terminates.
#[async_trait]
pub trait ReflectionEvaluator: Send + Sync {
    async fn reflect(
        &self,
        topic: &str,
        round: u32,
        sources: &[Source],
    ) -> Result<Reflection, ReflectionUnavailable>;
}

/// Produces the final markdown answer with citations mapped to source ids.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        topic: &str,
        sources: &[Source],
    ) -> Result<String, SynthesisUnavailable>;
}
