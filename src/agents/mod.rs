//! Agent System
//!
//! LLM-backed implementations of the research capabilities the engine
//! drives:
//!
//! - **Query Writer**: turns a research topic into diverse search queries
//! - **Reflection Agent**: judges evidence sufficiency and names gaps
//! - **Synthesis Agent**: writes the final cited markdown answer
//!
//! ## Pipeline Overview
//!
//! ```text
//! Research Topic
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Query Writer│  → Generates search queries
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Web Search │  → Executes searches (in parallel)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Reflection  │  → Sufficient? Follow-up queries?
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Synthesis  │  → Cited markdown answer
//! └─────────────┘
//! ```
//!
//! Each agent holds a shared LLM handle and its own model name, so the
//! three generation roles can run on different models.

pub mod query_writer;
pub mod reflection;
pub mod synthesis;

pub use query_writer::QueryWriterAgent;
pub use reflection::ReflectionAgent;
pub use synthesis::SynthesisAgent;

/// Extract the JSON payload from an LLM response that may wrap it in a
/// fenced code block.
pub(crate) fn extract_json_block(response: &str) -> &str {
    if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    }
}

/// Today's date in the long format the prompts carry.
pub(crate) fn current_date() -> String {
    chrono::Utc::now().format("%B %d, %Y").to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let wrapped = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_block(wrapped), "{\"a\": 1}");
    }

    #[test]
    fn extracts_bare_fence() {
        let wrapped = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(wrapped), "{\"a\": 1}");
    }

    #[test]
    fn passes_plain_json_through() {
        assert_eq!(extract_json_block("  {\"a\": 1} "), "{\"a\": 1}");
    }
}
