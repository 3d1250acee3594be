//! The research orchestrator.
//!
//! Drives the capability traits in rounds, enforces the iteration bound,
//! aggregates run state, and emits the ordered progress-event sequence.
//! Per-call failures are absorbed here; only an invalid request, a dead
//! query generator before round 0, or caller cancellation terminate a run
//! without a result.

use crate::config::{Config, ResearchConfig};
use crate::engine::events::{EventSink, ProgressEvent};
use crate::engine::state::{Phase, ResearchRequest, ResearchResult, RunState, RunStatus};
use crate::engine::{
    AnswerSynthesizer, EngineError, GenerationUnavailable, QueryGenerator, Reflection,
    ReflectionEvaluator, SearchExecutor, SearchFailure,
};
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Deadlines bounding external calls within a run.
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    /// Independent deadline for each generate/search/reflect/synthesize call.
    pub call_timeout: Duration,
    /// Deadline for a whole round's search fan-out; searches still
    /// outstanding when it fires count as failed for that round.
    pub round_timeout: Duration,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            round_timeout: Duration::from_secs(120),
        }
    }
}

impl EngineLimits {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            round_timeout: Duration::from_secs(config.round_timeout_secs),
        }
    }
}

pub struct ResearchEngine {
    query_generator: Arc<dyn QueryGenerator>,
    search: Arc<dyn SearchExecutor>,
    reflection: Arc<dyn ReflectionEvaluator>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    limits: EngineLimits,
}

impl ResearchEngine {
    pub fn new(
        query_generator: Arc<dyn QueryGenerator>,
        search: Arc<dyn SearchExecutor>,
        reflection: Arc<dyn ReflectionEvaluator>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        limits: EngineLimits,
    ) -> Self {
        Self {
            query_generator,
            search,
            reflection,
            synthesizer,
            limits,
        }
    }

    /// Wire the production engine: LLM-backed agents plus the SerpAPI
    /// search client, all configured from the environment.
    pub fn from_config(config: &Config) -> Self {
        use crate::agents::{QueryWriterAgent, ReflectionAgent, SynthesisAgent};
        use crate::llm::{LLMProviderConfig, LLM};
        use crate::search::{DisabledSearch, SerpApiClient};

        let llm = Arc::new(LLM::new(LLMProviderConfig {
            name: config.llm.provider.clone(),
            api_key: config.llm.api_key().to_string(),
        }));

        let search: Arc<dyn SearchExecutor> = match SerpApiClient::from_config(&config.search) {
            Some(client) => Arc::new(client),
            None => {
                warn!("SERPAPI_KEY not set; searches will be reported unavailable");
                Arc::new(DisabledSearch)
            }
        };

        Self::new(
            Arc::new(QueryWriterAgent::new(
                Arc::clone(&llm),
                config.llm.query_generator_model.clone(),
            )),
            search,
            Arc::new(ReflectionAgent::new(
                Arc::clone(&llm),
                config.llm.reflection_model.clone(),
            )),
            Arc::new(SynthesisAgent::new(
                Arc::clone(&llm),
                config.llm.answer_model.clone(),
            )),
            EngineLimits::from_config(&config.research),
        )
    }

    /// Execute one research run.
    ///
    /// Progress events go to `events` in state-machine order with exactly
    /// one terminal event. The returned result mirrors the terminal event;
    /// `Err` is only produced for an invalid request, a query generator
    /// that could not start the run, or cancellation.
    pub async fn run(
        &self,
        request: ResearchRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<ResearchResult, EngineError> {
        validate(&request)?;

        let outcome = self.run_inner(&request, &events, &cancel).await;
        match &outcome {
            Err(EngineError::Cancelled) => events.emit(ProgressEvent::Cancelled).await,
            Err(EngineError::Generation(_)) => {
                // Observers still get a terminal event; the caller gets the
                // error itself.
                events
                    .emit(ProgressEvent::Failed {
                        result: ResearchResult::empty_failed(),
                    })
                    .await;
            }
            _ => {}
        }
        outcome
    }

    async fn run_inner(
        &self,
        request: &ResearchRequest,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<ResearchResult, EngineError> {
        let mut state = RunState::new();
        let topic = request.topic.trim().to_string();

        info!(
            run_id = %state.run_id,
            topic = %topic,
            max_loops = request.max_loops,
            initial_queries = request.initial_query_count,
            "Starting research run"
        );

        // Round 0: the only point where query generation is fatal.
        let mut round_queries = match self
            .bounded(
                cancel,
                self.query_generator
                    .generate(&topic, request.initial_query_count, &[]),
            )
            .await?
        {
            Some(Ok(queries)) => dedupe_queries(queries, request.initial_query_count, &state),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(GenerationUnavailable("call timed out".to_string()).into()),
        };
        if round_queries.is_empty() {
            return Err(GenerationUnavailable("produced no usable queries".to_string()).into());
        }

        loop {
            let round = state.round;
            state.phase = Phase::Generating;
            state.record_queries(round, &round_queries);
            events
                .emit(ProgressEvent::Generating {
                    round,
                    queries: round_queries.clone(),
                })
                .await;

            state.phase = Phase::Searching;
            self.run_search_round(&mut state, &round_queries, events, cancel)
                .await?;

            state.phase = Phase::Reflecting;
            let reflection = match self
                .bounded(
                    cancel,
                    self.reflection.reflect(&topic, round, state.sources()),
                )
                .await?
            {
                Some(Ok(reflection)) => reflection,
                Some(Err(e)) => {
                    warn!(round, error = %e, "Reflection failed; treating round as inconclusive");
                    Reflection::inconclusive()
                }
                None => {
                    warn!(round, "Reflection timed out; treating round as inconclusive");
                    Reflection::inconclusive()
                }
            };
            state.notes.extend(reflection.notes.iter().cloned());
            events
                .emit(ProgressEvent::Reflecting {
                    round,
                    sufficient: reflection.sufficient,
                    notes: reflection.notes.clone(),
                })
                .await;

            // Termination: advisory sufficiency OR the hard bound. The
            // bound wins regardless of what reflection says.
            if reflection.sufficient || round + 1 >= request.max_loops {
                break;
            }

            // Follow-ups become the next round's query set, deduplicated
            // against everything already issued and capped per round.
            let mut next = dedupe_queries(
                reflection.follow_up_queries,
                request.initial_query_count,
                &state,
            );
            if next.is_empty() {
                // Nothing usable from reflection; one more shot via the
                // generator. Failure here means "stop", not "abort".
                let prior = state.prior_query_texts();
                next = match self
                    .bounded(
                        cancel,
                        self.query_generator
                            .generate(&topic, request.initial_query_count, &prior),
                    )
                    .await?
                {
                    Some(Ok(queries)) => {
                        dedupe_queries(queries, request.initial_query_count, &state)
                    }
                    Some(Err(e)) => {
                        warn!(round, error = %e, "Follow-up generation failed; stopping loop");
                        Vec::new()
                    }
                    None => {
                        warn!(round, "Follow-up generation timed out; stopping loop");
                        Vec::new()
                    }
                };
            }
            if next.is_empty() {
                break;
            }

            state.round += 1;
            round_queries = next;
        }

        let iterations = state.round + 1;

        state.phase = Phase::Synthesizing;
        events
            .emit(ProgressEvent::Synthesizing {
                rounds: iterations,
                source_count: state.source_count(),
            })
            .await;

        let run_id = state.run_id;
        let synthesis = self
            .bounded(cancel, self.synthesizer.synthesize(&topic, state.sources()))
            .await?;
        let result = match synthesis {
            Some(Ok(answer)) => ResearchResult {
                answer,
                sources: state.into_sources(),
                iterations,
                status: RunStatus::Completed,
            },
            Some(Err(e)) => {
                // Degrade, never drop: gathered sources have standalone
                // value even without a finished answer.
                warn!(error = %e, "Synthesis failed; returning partial result");
                ResearchResult {
                    answer: e.partial,
                    sources: state.into_sources(),
                    iterations,
                    status: RunStatus::Failed,
                }
            }
            None => {
                warn!("Synthesis timed out; returning partial result");
                ResearchResult {
                    answer: String::new(),
                    sources: state.into_sources(),
                    iterations,
                    status: RunStatus::Failed,
                }
            }
        };

        match result.status {
            RunStatus::Completed => {
                events
                    .emit(ProgressEvent::Completed {
                        result: result.clone(),
                    })
                    .await
            }
            RunStatus::Failed => {
                events
                    .emit(ProgressEvent::Failed {
                        result: result.clone(),
                    })
                    .await
            }
        }

        info!(
            run_id = %run_id,
            iterations,
            sources = result.sources.len(),
            status = %result.status,
            "Research run finished"
        );

        Ok(result)
    }

    /// Fan out all searches of the current round concurrently and merge
    /// results as they settle. The round completes when every search has
    /// settled or the round deadline fires; individual failures are
    /// logged and absorbed.
    async fn run_search_round(
        &self,
        state: &mut RunState,
        queries: &[String],
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let round = state.round;
        let call_timeout = self.limits.call_timeout;

        let mut settled = futures::stream::iter(queries.to_vec())
            .map(|query| {
                let search = Arc::clone(&self.search);
                async move {
                    let outcome = match timeout(call_timeout, search.search(&query)).await {
                        Ok(Ok(hits)) => Ok(hits),
                        Ok(Err(failure)) => Err(failure),
                        Err(_) => Err(SearchFailure::Timeout),
                    };
                    (query, outcome)
                }
            })
            .buffer_unordered(queries.len().max(1));

        let deadline = tokio::time::sleep(self.limits.round_timeout);
        tokio::pin!(deadline);

        let mut failures = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = &mut deadline => {
                    warn!(round, "Round deadline elapsed; treating outstanding searches as failed");
                    break;
                }
                next = settled.next() => match next {
                    None => break,
                    Some((query, Ok(hits))) => {
                        let new_sources = state.merge_hits(hits);
                        events
                            .emit(ProgressEvent::Searching {
                                round,
                                query,
                                new_sources,
                                sources_total: state.source_count(),
                            })
                            .await;
                    }
                    Some((query, Err(failure))) => {
                        failures += 1;
                        warn!(round, query = %query, error = %failure, "Search failed; continuing round");
                    }
                }
            }
        }

        if !queries.is_empty() && failures == queries.len() {
            // Not a run failure: the round simply contributed nothing.
            info!(round, "All searches in round failed; round yields zero new sources");
        }

        Ok(())
    }

    /// Await `future` under the per-call deadline, aborting immediately if
    /// the run is cancelled. `Ok(None)` means the deadline elapsed.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        future: impl Future<Output = T>,
    ) -> Result<Option<T>, EngineError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            outcome = timeout(self.limits.call_timeout, future) => Ok(outcome.ok()),
        }
    }
}

fn validate(request: &ResearchRequest) -> Result<(), EngineError> {
    if request.topic.trim().is_empty() {
        return Err(EngineError::InvalidRequest(
            "topic must not be empty".to_string(),
        ));
    }
    if request.max_loops < 1 {
        return Err(EngineError::InvalidRequest(
            "max_loops must be at least 1".to_string(),
        ));
    }
    if request.initial_query_count < 1 {
        return Err(EngineError::InvalidRequest(
            "initial_query_count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Trim, drop empties, reject anything already issued in a prior round,
/// collapse duplicates within the batch, and cap the result.
fn dedupe_queries(candidates: Vec<String>, cap: usize, state: &RunState) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queries = Vec::new();

    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if state.has_query(trimmed) || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        queries.push(trimmed.to_string());
        if queries.len() == cap {
            break;
        }
    }

    queries
}
