use super::*;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use time::macros::datetime;

use crate::admission::memory::MemoryStore;
use crate::admission::tier::TierLimitTable;

fn body(prompt: &str, model: &str) -> SubmitBody {
    SubmitBody { prompt: prompt.into(), model: model.into(), parameters: CompletionParams::default() }
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// validate_submit
// =============================================================================

#[test]
fn valid_body_passes() {
    assert!(validate_submit(&body("hello", "gpt-4o-mini")).is_ok());
}

#[test]
fn empty_prompt_rejected() {
    assert!(validate_submit(&body("", "gpt-4o-mini")).is_err());
}

#[test]
fn prompt_length_counts_chars_not_bytes() {
    assert!(validate_submit(&body(&"é".repeat(PROMPT_MAX_CHARS), "gpt-4")).is_ok());
    assert!(validate_submit(&body(&"a".repeat(PROMPT_MAX_CHARS + 1), "gpt-4")).is_err());
}

#[test]
fn blank_model_rejected() {
    assert!(validate_submit(&body("hi", "  ")).is_err());
}

#[test]
fn model_without_provider_rejected() {
    assert_eq!(validate_submit(&body("hi", "claude-3")), Err("model is not supported"));
    assert!(validate_submit(&body("hi", "gemini-2.0-flash")).is_ok());
}

#[test]
fn parameter_ranges_enforced() {
    let mut b = body("hi", "gpt-4");
    b.parameters.temperature = Some(2.5);
    assert_eq!(validate_submit(&b), Err("temperature must be between 0 and 2"));

    let mut b = body("hi", "gpt-4");
    b.parameters.max_tokens = Some(0);
    assert_eq!(validate_submit(&b), Err("maxTokens must be between 1 and 32768"));

    let mut b = body("hi", "gpt-4");
    b.parameters.max_tokens = Some(MAX_TOKENS_LIMIT);
    b.parameters.top_p = Some(1.0);
    b.parameters.temperature = Some(0.0);
    assert!(validate_submit(&b).is_ok());

    let mut b = body("hi", "gpt-4");
    b.parameters.top_p = Some(-0.1);
    assert_eq!(validate_submit(&b), Err("topP must be between 0 and 1"));
}

#[test]
fn body_parses_camel_case_parameters() {
    let b: SubmitBody = serde_json::from_str(
        r#"{"prompt":"p","model":"gemini-pro","parameters":{"maxTokens":64,"topP":0.5}}"#,
    )
    .unwrap();
    assert_eq!(b.parameters.max_tokens, Some(64));
    assert_eq!(b.parameters.top_p, Some(0.5));
    assert_eq!(b.parameters.temperature, None);
}

#[test]
fn body_parameters_default_when_absent() {
    let b: SubmitBody = serde_json::from_str(r#"{"prompt":"p","model":"gpt-4"}"#).unwrap();
    assert_eq!(b.parameters, CompletionParams::default());
}

// =============================================================================
// denial_response
// =============================================================================

#[tokio::test]
async fn rate_denial_sets_retry_after() {
    let now = datetime!(2026-03-07 12:00:15 UTC);
    let decision = AdmissionDecision {
        allowed: false,
        limit_type: Some(crate::admission::LimitType::Rate),
        limit: 10,
        remaining: 0,
        reset_time: Some(datetime!(2026-03-07 12:01:00 UTC)),
    };
    let response = denial_response(&decision, now);
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "45");

    let json = json_body(response).await;
    assert_eq!(json["error"], "Rate limit exceeded");
    assert_eq!(json["allowed"], false);
    assert_eq!(json["limitType"], "rate");
    assert_eq!(json["limit"], 10);
    assert_eq!(json["remaining"], 0);
    assert_eq!(json["resetTime"], "2026-03-07T12:01:00Z");
}

#[tokio::test]
async fn unavailable_denial_has_no_retry_after() {
    let response = denial_response(&AdmissionDecision::unavailable(), OffsetDateTime::now_utc());
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(RETRY_AFTER).is_none());

    let json = json_body(response).await;
    assert_eq!(json["allowed"], false);
    assert!(json.get("limitType").is_none());
    assert_eq!(json["limit"], 0);
    assert!(json["resetTime"].is_null());
}

#[test]
fn not_found_maps_to_404() {
    let response = inference_error_to_response(InferenceError::NotFound(Uuid::nil()));
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn in_flight_delete_maps_to_409() {
    let response = inference_error_to_response(InferenceError::InFlight(Uuid::nil()));
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "Request still processing");
}

#[test]
fn bad_status_maps_to_500() {
    let response = inference_error_to_response(InferenceError::BadStatus("weird".into()));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// admit_submission
// =============================================================================

fn free_account() -> Account {
    Account { id: Uuid::new_v4(), email: "free@example.test".into(), tier: "free".into() }
}

fn gate_over(store: &Arc<MemoryStore>) -> AdmissionGate {
    AdmissionGate::new(store.clone(), TierLimitTable::defaults(), Duration::from_millis(100))
}

#[tokio::test]
async fn admitted_submission_yields_job_and_accepted_body() {
    let store = Arc::new(MemoryStore::new());
    let account = free_account();
    let now = OffsetDateTime::now_utc();

    let Ok((job, accepted)) = admit_submission(&gate_over(&store), &account, body("hello", "gpt-4o-mini"), now).await
    else {
        panic!("expected admission");
    };
    assert_eq!(job.request_id, accepted.id);
    assert_eq!(job.user_id, account.id);
    assert_eq!(job.prompt, "hello");
    assert_eq!(job.params.max_tokens, DEFAULT_INFERENCE_MAX_TOKENS);
    assert_eq!(store.status_of(accepted.id), Some(RequestStatus::Pending));

    let json = serde_json::to_value(&accepted).unwrap();
    assert_eq!(json["id"], accepted.id.to_string());
    assert_eq!(json["status"], "pending");
    assert!(json["createdAt"].is_string());
}

#[tokio::test]
async fn denied_submission_returns_429_without_job() {
    let store = Arc::new(MemoryStore::new());
    let account = free_account();
    store.seed_request(account.id, RequestStatus::Pending);
    store.seed_request(account.id, RequestStatus::Processing);

    let result = admit_submission(&gate_over(&store), &account, body("hello", "gpt-4"), OffsetDateTime::now_utc()).await;
    let Err(response) = result else {
        panic!("expected denial");
    };
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(response).await["limitType"], "concurrency");
    assert_eq!(store.request_rows(account.id), 2);
}

#[tokio::test]
async fn invalid_submission_spends_no_budget() {
    let store = Arc::new(MemoryStore::new());
    let account = free_account();

    let result =
        admit_submission(&gate_over(&store), &account, body("hello", "claude-3"), OffsetDateTime::now_utc()).await;
    let Err(response) = result else {
        panic!("expected rejection");
    };
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.bucket_rows(), 0);
    assert_eq!(store.request_rows(account.id), 0);
}
