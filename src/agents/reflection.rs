//! Reflection Agent
//!
//! Evaluates the evidence gathered so far against the research topic:
//! is it sufficient, and if not, what should the next round search for?
//! The verdict is advisory; the engine alone decides when the loop stops.

use crate::agents::{current_date, extract_json_block};
use crate::engine::{NoteKind, Reflection, ReflectionEvaluator, ReflectionNote, ReflectionUnavailable, Source};
use crate::llm::LLM;
use crate::types::{LLMMessage, LLMRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct ReflectionAgent {
    llm: Arc<LLM>,
    model: String,
}

/// Raw JSON response shape expected from the model.
#[derive(Debug, Deserialize)]
struct ReflectionRaw {
    #[serde(default)]
    is_sufficient: bool,
    #[serde(default)]
    knowledge_gap: String,
    #[serde(default)]
    follow_up_queries: Vec<String>,
}

impl ReflectionAgent {
    pub fn new(llm: Arc<LLM>, model: String) -> Self {
        Self { llm, model }
    }

    fn build_prompt(topic: &str, sources: &[Source]) -> String {
        let evidence = if sources.is_empty() {
            "(no sources gathered yet)".to_string()
        } else {
            sources
                .iter()
                .map(|s| format!("- {} {} ({}): {}", s.id, s.title, s.url, s.snippet))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"You are a research analyst evaluating whether gathered evidence
comprehensively answers a research topic.

Today's date: {date}

Research Topic: {topic}

Evidence gathered so far:
{evidence}

Decide whether the evidence is sufficient to answer the topic well. If it is
not, describe the most important knowledge gap and propose follow-up search
queries that would close it.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "is_sufficient": false,
  "knowledge_gap": "what is still missing, in one or two sentences",
  "follow_up_queries": [
    "follow-up search query"
  ]
}}"#,
            date = current_date(),
            topic = topic,
            evidence = evidence,
        )
    }
}

#[async_trait]
impl ReflectionEvaluator for ReflectionAgent {
    async fn reflect(
        &self,
        topic: &str,
        round: u32,
        sources: &[Source],
    ) -> Result<Reflection, ReflectionUnavailable> {
        info!(topic = %topic, round, sources = sources.len(), "Reflecting on gathered evidence");

        let request = LLMRequest {
            provider: self.llm.provider_name().to_string(),
            model: self.model.clone(),
            messages: vec![LLMMessage::user(Self::build_prompt(topic, sources))],
            max_tokens: Some(1024),
            temperature: Some(0.3),
            system_instruction: Some(
                "You are a rigorous research analyst that responds with only the requested JSON."
                    .to_string(),
            ),
        };

        let response = self
            .llm
            .create_chat_completion(&request)
            .await
            .map_err(|e| ReflectionUnavailable(e.to_string()))?;

        let parsed: ReflectionRaw = serde_json::from_str(extract_json_block(&response.content))
            .map_err(|e| ReflectionUnavailable(format!("unparseable reflection: {}", e)))?;

        let mut notes = Vec::new();
        if parsed.is_sufficient {
            notes.push(ReflectionNote {
                text: "evidence judged sufficient to answer the topic".to_string(),
                round,
                kind: NoteKind::Confirmation,
            });
        }
        if !parsed.knowledge_gap.trim().is_empty() {
            notes.push(ReflectionNote {
                text: parsed.knowledge_gap.trim().to_string(),
                round,
                kind: if parsed.is_sufficient {
                    NoteKind::Confirmation
                } else {
                    NoteKind::Gap
                },
            });
        }

        info!(
            sufficient = parsed.is_sufficient,
            follow_ups = parsed.follow_up_queries.len(),
            "Reflection complete"
        );

        Ok(Reflection {
            sufficient: parsed.is_sufficient,
            follow_up_queries: parsed.follow_up_queries,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{canned_llm, failing_llm};

    fn source(id: &str, url: &str) -> Source {
        Source {
            id: id.to_string(),
            url: url.to_string(),
            title: "title".to_string(),
            snippet: "snippet".to_string(),
        }
    }

    #[tokio::test]
    async fn parses_insufficient_verdict_with_gap_note() {
        let agent = ReflectionAgent::new(
            canned_llm(
                r#"{"is_sufficient": false, "knowledge_gap": "missing recent benchmarks", "follow_up_queries": ["2026 benchmarks"]}"#,
            ),
            "test-model".to_string(),
        );

        let reflection = agent
            .reflect("topic", 1, &[source("[a.com-111111]", "https://a.com")])
            .await
            .unwrap();

        assert!(!reflection.sufficient);
        assert_eq!(reflection.follow_up_queries, vec!["2026 benchmarks"]);
        assert_eq!(reflection.notes.len(), 1);
        assert_eq!(reflection.notes[0].kind, NoteKind::Gap);
        assert_eq!(reflection.notes[0].round, 1);
    }

    #[tokio::test]
    async fn sufficient_verdict_produces_confirmation_note() {
        let agent = ReflectionAgent::new(
            canned_llm(r#"{"is_sufficient": true, "knowledge_gap": "", "follow_up_queries": []}"#),
            "test-model".to_string(),
        );

        let reflection = agent.reflect("topic", 0, &[]).await.unwrap();

        assert!(reflection.sufficient);
        assert!(reflection.follow_up_queries.is_empty());
        assert_eq!(reflection.notes.len(), 1);
        assert_eq!(reflection.notes[0].kind, NoteKind::Confirmation);
    }

    #[tokio::test]
    async fn unparseable_response_is_unavailable() {
        let agent = ReflectionAgent::new(
            canned_llm("the evidence seems fine to me"),
            "test-model".to_string(),
        );

        let err = agent.reflect("topic", 0, &[]).await.unwrap_err();
        assert!(err.to_string().contains("unparseable"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_unavailable() {
        let agent = ReflectionAgent::new(failing_llm(), "test-model".to_string());

        assert!(agent.reflect("topic", 0, &[]).await.is_err());
    }
}
