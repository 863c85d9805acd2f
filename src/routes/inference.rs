//! Inference API: submit a prompt, poll its status, fetch its result.
//!
//! SYSTEM CONTEXT
//! ==============
//! `POST /api/inference` is the paid path: the body is validated, the
//! admission gate decides, and an admitted request is handed to the
//! dispatcher while the caller gets 202 with the request id. Denials are 429
//! with the gate's decision in the body and `Retry-After` when the limit has
//! a known reset instant.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::auth::ApiKeyAuth;
use super::error_json;
use crate::admission::store::NewInferenceRequest;
use crate::admission::{AdmissionDecision, AdmissionGate};
use crate::llm::ProviderKind;
use crate::llm::types::{CompletionParams, DEFAULT_INFERENCE_MAX_TOKENS};
use crate::services::dispatcher::InferenceJob;
use crate::services::inference::{self as inference_svc, InferenceError, RequestStatus};
use crate::services::session::Account;
use crate::state::AppState;

pub const PROMPT_MAX_CHARS: usize = 10_000;
pub const MAX_TOKENS_LIMIT: u32 = 32_768;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub prompt: String,
    pub model: String,
    #[serde(default)]
    pub parameters: CompletionParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Accepted {
    id: Uuid,
    status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

/// Body of a 429: the decision plus a human-readable error.
#[derive(Serialize)]
struct Denied<'a> {
    error: &'static str,
    #[serde(flatten)]
    decision: &'a AdmissionDecision,
}

pub(crate) fn validate_submit(body: &SubmitBody) -> Result<(), &'static str> {
    let prompt_chars = body.prompt.chars().count();
    if prompt_chars == 0 || prompt_chars > PROMPT_MAX_CHARS {
        return Err("prompt must be between 1 and 10000 characters");
    }
    if body.model.trim().is_empty() {
        return Err("model is required");
    }
    if ProviderKind::for_model(&body.model).is_none() {
        return Err("model is not supported");
    }
    let p = &body.parameters;
    if p.temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
        return Err("temperature must be between 0 and 2");
    }
    if p.max_tokens.is_some_and(|m| !(1..=MAX_TOKENS_LIMIT).contains(&m)) {
        return Err("maxTokens must be between 1 and 32768");
    }
    if p.top_p.is_some_and(|v| !(0.0..=1.0).contains(&v)) {
        return Err("topP must be between 0 and 1");
    }
    Ok(())
}

/// 429 for a gate denial, with `Retry-After` when a reset instant is known.
pub(crate) fn denial_response(decision: &AdmissionDecision, now: OffsetDateTime) -> Response {
    let body = Json(Denied { error: "Rate limit exceeded", decision });
    match decision.retry_after_secs(now) {
        Some(secs) => (StatusCode::TOO_MANY_REQUESTS, [(RETRY_AFTER, secs.to_string())], body).into_response(),
        None => (StatusCode::TOO_MANY_REQUESTS, body).into_response(),
    }
}

pub(crate) fn inference_error_to_response(err: InferenceError) -> Response {
    match err {
        InferenceError::NotFound(_) => error_json(StatusCode::NOT_FOUND, "Request not found"),
        InferenceError::InFlight(_) => error_json(StatusCode::CONFLICT, "Request still processing"),
        e => {
            tracing::error!(error = %e, "inference request lookup failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve inference request")
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Validate `body` and run it through the gate. On success the returned job
/// is ready to dispatch; every other outcome is the response to send.
pub(crate) async fn admit_submission(
    gate: &AdmissionGate,
    account: &Account,
    body: SubmitBody,
    now: OffsetDateTime,
) -> Result<(InferenceJob, Accepted), Response> {
    if let Err(message) = validate_submit(&body) {
        return Err(error_json(StatusCode::BAD_REQUEST, message));
    }

    let new_request = NewInferenceRequest {
        model: body.model.clone(),
        prompt: body.prompt.clone(),
        parameters: serde_json::to_value(body.parameters).unwrap_or_default(),
    };
    let admission = gate
        .admit_and_enqueue(account.id, &account.tier, now, &new_request)
        .await;

    let Some(pending) = admission.request else {
        return Err(denial_response(&admission.decision, now));
    };

    let job = InferenceJob {
        request_id: pending.id,
        user_id: account.id,
        model: body.model,
        prompt: body.prompt,
        params: body.parameters.resolve(DEFAULT_INFERENCE_MAX_TOKENS),
    };
    let accepted = Accepted { id: pending.id, status: RequestStatus::Pending, created_at: pending.created_at };
    Ok((job, accepted))
}

/// `POST /api/inference`: admit and enqueue a prompt.
pub async fn submit(
    State(state): State<AppState>,
    auth: ApiKeyAuth,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return error_json(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    match admit_submission(&state.gate, &auth.account, body, OffsetDateTime::now_utc()).await {
        Ok((job, accepted)) => {
            state.dispatcher.dispatch(job);
            (StatusCode::ACCEPTED, Json(accepted)).into_response()
        }
        Err(response) => response,
    }
}

/// `GET /api/inference/{id}`: full request row.
pub async fn get_request(State(state): State<AppState>, auth: ApiKeyAuth, Path(id): Path<Uuid>) -> Response {
    match inference_svc::get_request(&state.pool, id, auth.account.id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => inference_error_to_response(e),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceResult {
    id: Uuid,
    response: Option<String>,
    tokens_used: Option<i64>,
    processing_time: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    completed_at: Option<OffsetDateTime>,
}

/// `GET /api/inference/{id}/result`: 202 while in flight, 500 if failed.
pub async fn get_result(State(state): State<AppState>, auth: ApiKeyAuth, Path(id): Path<Uuid>) -> Response {
    let record = match inference_svc::get_request(&state.pool, id, auth.account.id).await {
        Ok(record) => record,
        Err(e) => return inference_error_to_response(e),
    };

    match record.status {
        RequestStatus::Pending | RequestStatus::Processing => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": record.status, "message": "Processing" })),
        )
            .into_response(),
        RequestStatus::Failed => error_json(StatusCode::INTERNAL_SERVER_ERROR, "Inference failed"),
        RequestStatus::Completed => Json(InferenceResult {
            id: record.id,
            response: record.response,
            tokens_used: record.tokens_total,
            processing_time: record.processing_time_ms,
            completed_at: record.completed_at,
        })
        .into_response(),
    }
}

#[cfg(test)]
#[path = "inference_test.rs"]
mod tests;
