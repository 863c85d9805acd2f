//! LLM: multi-provider adapter for inference and chat.
//!
//! DESIGN
//! ======
//! Provider selection is per call, driven by the model name: `gpt-*` goes to
//! the `OpenAI` chat completions API and `gemini-*` to Gemini
//! `generateContent`. Either provider may be unconfigured; calls for its
//! models then fail with `LlmError::NotConfigured` and the caller records the
//! request as failed. Startup never fails on missing LLM credentials.

pub mod config;
pub mod gemini;
pub mod openai;
pub mod types;

use config::LlmConfig;
pub use types::LlmCompletion;
use types::{ChatMessage, Completion, LlmError, ResolvedParams};

// =============================================================================
// PROVIDER SELECTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    /// Pick the provider serving `model`, or `None` for unknown families.
    #[must_use]
    pub fn for_model(model: &str) -> Option<Self> {
        if model.starts_with("gpt-") {
            Some(Self::OpenAi)
        } else if model.starts_with("gemini-") {
            Some(Self::Gemini)
        } else {
            None
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
        }
    }
}

/// Model actually sent upstream for an API inference request.
#[must_use]
pub fn inference_backing_model(model: &str) -> &str {
    match ProviderKind::for_model(model) {
        Some(ProviderKind::Gemini) => gemini::resolve_inference_model(model),
        _ => model,
    }
}

/// Model actually sent upstream for a dashboard chat turn.
#[must_use]
pub fn chat_backing_model(model: &str) -> &str {
    match ProviderKind::for_model(model) {
        Some(ProviderKind::Gemini) => gemini::resolve_chat_model(model),
        _ => model,
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Routes each completion to the provider that serves the requested model.
pub struct LlmRouter {
    openai: Option<openai::OpenAiClient>,
    gemini: Option<gemini::GeminiClient>,
}

impl LlmRouter {
    /// Build a router from environment variables. See [`LlmConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if a provider HTTP client fails to build.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_config(LlmConfig::from_env())
    }

    /// Build a router from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let openai = config
            .openai
            .map(|creds| openai::OpenAiClient::new(creds, config.timeouts))
            .transpose()?;
        let gemini = config
            .gemini
            .map(|creds| gemini::GeminiClient::new(creds, config.timeouts))
            .transpose()?;
        Ok(Self { openai, gemini })
    }

    /// Providers that have credentials, for the startup log line.
    #[must_use]
    pub fn configured(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.openai.is_some() {
            out.push(ProviderKind::OpenAi.name());
        }
        if self.gemini.is_some() {
            out.push(ProviderKind::Gemini.name());
        }
        out
    }
}

#[async_trait::async_trait]
impl LlmCompletion for LlmRouter {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &ResolvedParams,
    ) -> Result<Completion, LlmError> {
        let kind = ProviderKind::for_model(model).ok_or_else(|| LlmError::UnsupportedModel(model.to_string()))?;
        match kind {
            ProviderKind::OpenAi => {
                let client = self
                    .openai
                    .as_ref()
                    .ok_or(LlmError::NotConfigured { provider: kind.name() })?;
                client.complete(model, messages, params).await
            }
            ProviderKind::Gemini => {
                let client = self
                    .gemini
                    .as_ref()
                    .ok_or(LlmError::NotConfigured { provider: kind.name() })?;
                client.complete(model, messages, params).await
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
