//! LLM provider configuration parsed from environment variables.

use crate::config::env_parse;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// `None` when `OPENAI_API_KEY` is unset; `gpt-*` models then fail.
    pub openai: Option<ProviderCredentials>,
    /// `None` when `GEMINI_API_KEY` is unset; `gemini-*` models then fail.
    pub gemini: Option<ProviderCredentials>,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`
    /// - `GEMINI_API_KEY`, `GEMINI_BASE_URL`
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 120
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            openai: credentials("OPENAI_API_KEY", "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            gemini: credentials("GEMINI_API_KEY", "GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            timeouts: LlmTimeouts {
                request_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
            },
        }
    }
}

fn credentials(key_var: &str, url_var: &str, default_url: &str) -> Option<ProviderCredentials> {
    let api_key = std::env::var(key_var)
        .ok()
        .filter(|k| !k.trim().is_empty())?;
    let base_url = normalize_base_url(std::env::var(url_var).ok().as_deref(), default_url);
    Some(ProviderCredentials { api_key, base_url })
}

fn normalize_base_url(raw: Option<&str>, default_url: &str) -> String {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_url)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
