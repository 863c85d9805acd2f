//! Gemini `generateContent` client.
//!
//! Gemini has no `assistant` role: prior model turns are sent as `model`, and
//! system turns are folded into `user`. When the response carries no usage
//! metadata, token counts are estimated from character length.
//!
//! The client sends the model name it is given. Public names are mapped to
//! backing models by the caller: API inference and dashboard chat keep
//! separate alias tables.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::config::{LlmTimeouts, ProviderCredentials};
use super::types::{ChatMessage, Completion, LlmError, ResolvedParams, estimate_tokens};

/// Backing model for the legacy public names (`gemini-pro`, `gemini-1.5-*`)
/// on the inference path.
const LEGACY_BACKING_MODEL: &str = "gemini-1.5-flash-8b";

/// Chat backing model for any name outside the chat table.
const CHAT_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Backing model for an API inference request.
#[must_use]
pub fn resolve_inference_model(model: &str) -> &str {
    if model == "gemini-pro" || model.starts_with("gemini-1.5-") {
        LEGACY_BACKING_MODEL
    } else {
        model
    }
}

/// Backing model for a dashboard chat turn.
#[must_use]
pub fn resolve_chat_model(model: &str) -> &str {
    match model {
        "gemini-pro" => "gemini-1.5-flash",
        "gemini-2.0-flash" | "gemini-2.5-flash" => model,
        _ => CHAT_DEFAULT_MODEL,
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(credentials: ProviderCredentials, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key: credentials.api_key, base_url: credentials.base_url })
    }

    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &ResolvedParams,
    ) -> Result<Completion, LlmError> {
        let contents = build_contents(messages);
        let body = GenerateRequest {
            contents: &contents,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                top_p: params.top_p,
            },
        };
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }
        let prompt_chars = messages.iter().map(|m| m.content.chars().count()).sum();
        parse_generate_response(&text, prompt_chars)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [GeminiContent],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

fn build_contents(messages: &[ChatMessage]) -> Vec<GeminiContent> {
    messages
        .iter()
        .map(|m| GeminiContent {
            role: if m.role == "assistant" { "model" } else { "user" },
            parts: vec![GeminiPart { text: m.content.clone() }],
        })
        .collect()
}

pub(crate) fn parse_generate_response(json_text: &str, prompt_chars: usize) -> Result<Completion, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let Some(candidate) = root
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(LlmError::ApiParse("generateContent: missing candidates[0]".to_string()));
    };

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let usage = root.get("usageMetadata");
    let tokens_prompt = usage
        .and_then(|u| u.get("promptTokenCount"))
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .unwrap_or_else(|| estimate_tokens(prompt_chars));
    let tokens_completion = usage
        .and_then(|u| u.get("candidatesTokenCount"))
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .unwrap_or_else(|| estimate_tokens(text.chars().count()));

    Ok(Completion { text, tokens_prompt, tokens_completion })
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
