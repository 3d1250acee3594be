//! Synthesis Agent
//!
//! Writes the final markdown answer from the accumulated sources. Citation
//! markers in the output are checked against the known source identifiers;
//! anything the model invented is stripped so every surviving citation
//! resolves to a listed source.

use crate::agents::current_date;
use crate::engine::{AnswerSynthesizer, Source, SynthesisUnavailable};
use crate::llm::LLM;
use crate::types::{LLMMessage, LLMRequest};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub struct SynthesisAgent {
    llm: Arc<LLM>,
    model: String,
}

impl SynthesisAgent {
    pub fn new(llm: Arc<LLM>, model: String) -> Self {
        Self { llm, model }
    }

    fn build_prompt(topic: &str, sources: &[Source]) -> String {
        let evidence = if sources.is_empty() {
            "(no sources were gathered; answer from general knowledge and say so)".to_string()
        } else {
            sources
                .iter()
                .map(|s| format!("{} {} — {}\n{}", s.id, s.title, s.url, s.snippet))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        format!(
            r#"You are a research writer producing a final report.

Today's date: {date}

Research Topic: {topic}

Sources:
{evidence}

Write a comprehensive, well-structured markdown answer to the research topic:
- Directly address the topic and organize the answer with clear sections.
- Integrate the sources into a coherent narrative; note disagreements.
- Cite sources inline using their exact bracketed identifiers as they appear
  above (for example {example}). Do not invent identifiers.
- End with a short conclusion of the key takeaways.

Respond with the markdown answer only."#,
            date = current_date(),
            topic = topic,
            evidence = evidence,
            example = sources
                .first()
                .map(|s| s.id.clone())
                .unwrap_or_else(|| "[example.com-a1b2c3]".to_string()),
        )
    }
}

#[async_trait]
impl AnswerSynthesizer for SynthesisAgent {
    async fn synthesize(
        &self,
        topic: &str,
        sources: &[Source],
    ) -> Result<String, SynthesisUnavailable> {
        info!(topic = %topic, sources = sources.len(), "Synthesizing final answer");

        let request = LLMRequest {
            provider: self.llm.provider_name().to_string(),
            model: self.model.clone(),
            messages: vec![LLMMessage::user(Self::build_prompt(topic, sources))],
            max_tokens: Some(4096),
            temperature: Some(0.4),
            system_instruction: Some(
                "You are an expert research writer. Cite only the identifiers you were given."
                    .to_string(),
            ),
        };

        let response =
            self.llm
                .create_chat_completion(&request)
                .await
                .map_err(|e| SynthesisUnavailable {
                    reason: e.to_string(),
                    partial: String::new(),
                })?;

        let answer = sanitize_citations(&response.content, sources);
        info!(answer_len = answer.len(), "Answer synthesized");
        Ok(answer)
    }
}

/// Remove citation markers that do not resolve to a known source id.
///
/// A citation marker is a bracketed token with no whitespace that contains
/// a dash and is not immediately followed by `(` — which keeps markdown
/// links intact.
fn sanitize_citations(answer: &str, sources: &[Source]) -> String {
    let known: HashSet<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    let mut out = String::with_capacity(answer.len());
    let mut rest = answer;

    while let Some(open) = rest.find('[') {
        let (before, from_open) = rest.split_at(open);
        out.push_str(before);

        match from_open.find(']') {
            Some(close) => {
                let token = &from_open[..=close];
                let inner = &token[1..token.len() - 1];
                let followed_by_paren = from_open[close + 1..].starts_with('(');
                let is_marker = !inner.is_empty()
                    && !inner.chars().any(char::is_whitespace)
                    && inner.contains('-')
                    && !followed_by_paren;

                if is_marker {
                    if known.contains(token) {
                        out.push_str(token);
                    }
                    rest = &from_open[close + 1..];
                } else {
                    out.push('[');
                    rest = &from_open[1..];
                }
            }
            None => {
                out.push_str(from_open);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{canned_llm, failing_llm};

    fn source(id: &str) -> Source {
        Source {
            id: id.to_string(),
            url: "https://example.com".to_string(),
            title: "title".to_string(),
            snippet: "snippet".to_string(),
        }
    }

    #[test]
    fn keeps_known_markers_and_drops_invented_ones() {
        let sources = vec![source("[a.com-111111]")];
        let answer = "Finding one [a.com-111111]. Finding two [b.com-999999].";
        assert_eq!(
            sanitize_citations(answer, &sources),
            "Finding one [a.com-111111]. Finding two ."
        );
    }

    #[test]
    fn preserves_markdown_links_and_plain_brackets() {
        let sources = vec![source("[a.com-111111]")];
        let answer = "See [the docs](https://docs.example.com) and [note 1].";
        assert_eq!(sanitize_citations(answer, &sources), answer);
    }

    #[test]
    fn handles_unclosed_bracket() {
        let sources = vec![source("[a.com-111111]")];
        let answer = "Dangling [bracket";
        assert_eq!(sanitize_citations(answer, &sources), answer);
    }

    #[tokio::test]
    async fn synthesized_answer_is_sanitized() {
        let sources = vec![source("[a.com-111111]")];
        let agent = SynthesisAgent::new(
            canned_llm("Claim [a.com-111111], bogus claim [z.com-000000]."),
            "test-model".to_string(),
        );

        let answer = agent.synthesize("topic", &sources).await.unwrap();
        assert!(answer.contains("[a.com-111111]"));
        assert!(!answer.contains("[z.com-000000]"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_unavailable_with_empty_partial() {
        let agent = SynthesisAgent::new(failing_llm(), "test-model".to_string());

        let err = agent.synthesize("topic", &[]).await.unwrap_err();
        assert!(err.partial.is_empty());
        assert!(err.reason.contains("LLM API error"));
    }
}
