//! Provider-neutral LLM messages, parameters and completions.

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No provider handles this model name.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The provider for this model has no API key configured.
    #[error("{provider} API key not configured")]
    NotConfigured { provider: &'static str },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A single turn in a conversation. `role` is `user`, `assistant` or `system`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Caller-supplied sampling parameters; unset fields take provider defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 1.0;
/// Default output budget for one-shot inference requests.
pub const DEFAULT_INFERENCE_MAX_TOKENS: u32 = 1000;
/// Default output budget for chat turns.
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 2000;

/// Parameters with every field filled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl CompletionParams {
    #[must_use]
    pub fn resolve(&self, default_max_tokens: u32) -> ResolvedParams {
        ResolvedParams {
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(default_max_tokens),
            top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
        }
    }
}

/// Text and token usage from one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
}

impl Completion {
    #[must_use]
    pub fn tokens_total(&self) -> u64 {
        self.tokens_prompt.saturating_add(self.tokens_completion)
    }
}

// =============================================================================
// COMPLETION TRAIT
// =============================================================================

/// Provider-neutral async trait for one completion call. Enables mocking in
/// tests.
#[async_trait::async_trait]
pub trait LlmCompletion: Send + Sync {
    /// Send `messages` to the provider serving `model`.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if no provider serves the model, the request
    /// fails, or the response is malformed.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &ResolvedParams,
    ) -> Result<Completion, LlmError>;
}

/// Rough token estimate used when a provider omits usage metadata.
#[must_use]
pub fn estimate_tokens(text_len: usize) -> u64 {
    u64::try_from(text_len.div_ceil(4)).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
