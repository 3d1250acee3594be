use crate::types::{AppResult, LLMRequest, LLMResponse};
use crate::utils::with_retry;
use async_trait::async_trait;

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> Self {
        let adapter: Box<dyn LLMAdapter> = match provider.name.as_str() {
            "gemini" => Box::new(crate::llm::gemini::GeminiAdapter::new(&provider.api_key)),
            "openai" => Box::new(crate::llm::openai::OpenAIAdapter::new(&provider.api_key)),
            _ => panic!("Unsupported provider: {}", provider.name),
        };

        Self {
            adapter,
            provider_name: provider.name,
        }
    }

    /// Wrap an existing adapter. Used to swap in stub adapters in tests.
    pub fn from_adapter(adapter: Box<dyn LLMAdapter>, provider_name: impl Into<String>) -> Self {
        Self {
            adapter,
            provider_name: provider_name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Completion with bounded retry; transient provider failures are
    /// retried before the error is surfaced to the caller.
    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        with_retry(|| self.adapter.create_chat_completion(request), 3).await
    }
}
