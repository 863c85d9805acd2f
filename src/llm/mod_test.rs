use super::*;
use config::{LlmTimeouts, ProviderCredentials};

fn timeouts() -> LlmTimeouts {
    LlmTimeouts { request_secs: 5, connect_secs: 1 }
}

fn params() -> ResolvedParams {
    types::CompletionParams::default().resolve(types::DEFAULT_INFERENCE_MAX_TOKENS)
}

#[test]
fn provider_for_model_prefixes() {
    assert_eq!(ProviderKind::for_model("gpt-4o-mini"), Some(ProviderKind::OpenAi));
    assert_eq!(ProviderKind::for_model("gemini-pro"), Some(ProviderKind::Gemini));
    assert_eq!(ProviderKind::for_model("claude-3"), None);
    assert_eq!(ProviderKind::for_model("GPT-4"), None);
}

#[test]
fn backing_models_differ_by_path_for_gemini_only() {
    assert_eq!(inference_backing_model("gemini-pro"), "gemini-1.5-flash-8b");
    assert_eq!(chat_backing_model("gemini-pro"), "gemini-1.5-flash");
    assert_eq!(inference_backing_model("gpt-4o"), "gpt-4o");
    assert_eq!(chat_backing_model("gpt-4o"), "gpt-4o");
}

#[test]
fn router_without_credentials_reports_nothing_configured() {
    let router = LlmRouter::from_config(LlmConfig { openai: None, gemini: None, timeouts: timeouts() }).unwrap();
    assert!(router.configured().is_empty());
}

#[test]
fn router_lists_configured_providers() {
    let creds = ProviderCredentials { api_key: "k".into(), base_url: "http://127.0.0.1:9".into() };
    let router =
        LlmRouter::from_config(LlmConfig { openai: Some(creds), gemini: None, timeouts: timeouts() }).unwrap();
    assert_eq!(router.configured(), vec!["OpenAI"]);
}

#[tokio::test]
async fn unknown_model_is_unsupported() {
    let router = LlmRouter::from_config(LlmConfig { openai: None, gemini: None, timeouts: timeouts() }).unwrap();
    let err = router
        .complete("llama-3", &[ChatMessage::user("hi")], &params())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::UnsupportedModel(m) if m == "llama-3"));
}

#[tokio::test]
async fn unconfigured_provider_is_reported() {
    let router = LlmRouter::from_config(LlmConfig { openai: None, gemini: None, timeouts: timeouts() }).unwrap();
    let err = router
        .complete("gemini-pro", &[ChatMessage::user("hi")], &params())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::NotConfigured { provider: "Gemini" }));
}
