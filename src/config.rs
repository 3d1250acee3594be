use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub gemini_api_key: String,
    pub openai_api_key: String,
    pub query_generator_model: String,
    pub reflection_model: String,
    pub answer_model: String,
}

impl LLMConfig {
    /// API key for the configured provider.
    pub fn api_key(&self) -> &str {
        match self.provider.as_str() {
            "openai" => &self.openai_api_key,
            _ => &self.gemini_api_key,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub max_results: usize,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    pub default_max_loops: u32,
    pub default_initial_queries: usize,
    pub call_timeout_secs: u64,
    pub round_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            llm: LLMConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".to_string()),
                gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                query_generator_model: env::var("QUERY_GENERATOR_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string()),
                reflection_model: env::var("REFLECTION_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash-thinking-exp".to_string()),
                answer_model: env::var("ANSWER_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string()),
            },
            search: SearchConfig {
                serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
                max_results: env::var("MAX_SOURCES_PER_QUERY")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                requests_per_second: env::var("SEARCH_REQUESTS_PER_SECOND")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()?,
            },
            research: ResearchConfig {
                default_max_loops: env::var("MAX_RESEARCH_LOOPS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()?,
                default_initial_queries: env::var("INITIAL_SEARCH_QUERY_COUNT")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
                call_timeout_secs: env::var("CALL_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
                round_timeout_secs: env::var("ROUND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()?,
            },
        })
    }
}
