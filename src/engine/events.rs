//! Progress events for a research run.
//!
//! Events are emitted in the exact order the run's state machine
//! transitions and are never duplicated. Every run ends with exactly one
//! terminal event: `completed`, `failed`, or `cancelled`.

use crate::engine::state::{ReflectionNote, ResearchResult};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A round's query set is ready.
    Generating { round: u32, queries: Vec<String> },
    /// One search of the current round settled successfully.
    Searching {
        round: u32,
        query: String,
        new_sources: usize,
        sources_total: usize,
    },
    /// Reflection finished for the round.
    Reflecting {
        round: u32,
        sufficient: bool,
        notes: Vec<ReflectionNote>,
    },
    /// The loop has stopped; answer synthesis is underway.
    Synthesizing { rounds: u32, source_count: usize },
    /// Terminal: the run produced a completed result.
    Completed { result: ResearchResult },
    /// Terminal: the run degraded to a failed result (partial answer and
    /// all gathered sources are still carried).
    Failed { result: ResearchResult },
    /// Terminal: the caller cancelled the run; partial state is discarded.
    Cancelled,
}

impl ProgressEvent {
    /// The phase tag this event serializes under.
    pub fn phase_name(&self) -> &'static str {
        match self {
            ProgressEvent::Generating { .. } => "generating",
            ProgressEvent::Searching { .. } => "searching",
            ProgressEvent::Reflecting { .. } => "reflecting",
            ProgressEvent::Synthesizing { .. } => "synthesizing",
            ProgressEvent::Completed { .. } => "completed",
            ProgressEvent::Failed { .. } => "failed",
            ProgressEvent::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. } | ProgressEvent::Cancelled
        )
    }
}

/// Where a run's progress events go. A sink may be backed by a channel for
/// live observers or disabled for fire-and-collect callers; either way the
/// orchestrator emits the same sequence.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops events. Runs still log their transitions.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Deliver an event. A departed observer is not an error: the run
    /// continues and the event is dropped.
    pub async fn emit(&self, event: ProgressEvent) {
        debug!(event = ?event, "progress event");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Build a sink/receiver pair for streaming observers.
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSink::new(tx), rx)
}
