//! Query Writer Agent
//!
//! Turns a research topic into a set of diverse, specific search queries.
//! Queries already issued in earlier rounds are excluded so every round
//! widens coverage instead of repeating it.

use crate::agents::{current_date, extract_json_block};
use crate::engine::{GenerationUnavailable, QueryGenerator};
use crate::llm::LLM;
use crate::types::{LLMMessage, LLMRequest};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub struct QueryWriterAgent {
    llm: Arc<LLM>,
    model: String,
}

/// Raw JSON response shape expected from the model.
#[derive(Debug, Deserialize)]
struct QueryListRaw {
    #[serde(default)]
    queries: Vec<String>,
}

impl QueryWriterAgent {
    pub fn new(llm: Arc<LLM>, model: String) -> Self {
        Self { llm, model }
    }

    fn build_prompt(topic: &str, count: usize, prior_queries: &[String]) -> String {
        let prior_block = if prior_queries.is_empty() {
            String::new()
        } else {
            format!(
                "\nQueries already issued (do NOT repeat or trivially rephrase any of these):\n{}\n",
                prior_queries
                    .iter()
                    .map(|q| format!("- {}", q))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        format!(
            r#"You are an expert research assistant generating web search queries.

Today's date: {date}

Research Topic: {topic}

Generate {count} diverse, specific search queries that together cover the topic.
Each query should target a different aspect or angle, use varied keywords, and
be specific enough to return high-quality results.
{prior}
OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "queries": [
    "first search query",
    "second search query"
  ]
}}"#,
            date = current_date(),
            topic = topic,
            count = count,
            prior = prior_block,
        )
    }

    fn parse_queries(response: &str) -> Result<Vec<String>> {
        let parsed: QueryListRaw = serde_json::from_str(extract_json_block(response))
            .map_err(|e| anyhow::anyhow!("Failed to parse query JSON: {}", e))?;
        Ok(parsed.queries)
    }
}

#[async_trait]
impl QueryGenerator for QueryWriterAgent {
    async fn generate(
        &self,
        topic: &str,
        count: usize,
        prior_queries: &[String],
    ) -> Result<Vec<String>, GenerationUnavailable> {
        info!(topic = %topic, count, prior = prior_queries.len(), "Generating search queries");

        let request = LLMRequest {
            provider: self.llm.provider_name().to_string(),
            model: self.model.clone(),
            messages: vec![LLMMessage::user(Self::build_prompt(
                topic,
                count,
                prior_queries,
            ))],
            max_tokens: Some(1024),
            temperature: Some(0.7),
            system_instruction: Some(
                "You are a research assistant that responds with only the requested JSON."
                    .to_string(),
            ),
        };

        let response = self
            .llm
            .create_chat_completion(&request)
            .await
            .map_err(|e| GenerationUnavailable(e.to_string()))?;

        let queries = match Self::parse_queries(&response.content) {
            Ok(queries) => queries,
            Err(e) => {
                warn!(error = %e, "Query response unparseable");
                // Before any queries exist the raw topic is still a usable
                // query; on later rounds an unparseable response means no
                // follow-ups.
                if prior_queries.is_empty() {
                    vec![topic.to_string()]
                } else {
                    Vec::new()
                }
            }
        };

        let excluded: Vec<String> = prior_queries
            .iter()
            .map(|q| q.trim().to_lowercase())
            .collect();
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && !excluded.contains(&q.to_lowercase()))
            .take(count)
            .collect();

        info!(generated = queries.len(), "Search queries ready");
        Ok(queries)
    }
}
