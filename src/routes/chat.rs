//! Dashboard chat: one synchronous provider call per turn.
//!
//! SYSTEM CONTEXT
//! ==============
//! Chat turns are admitted with `AdmissionGate::admit`, so they spend the same
//! per-minute budget as API inference. They are answered inline rather than
//! logged as inference requests, and therefore take no concurrency slot.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::auth::SessionAuth;
use super::error_json;
use super::inference::denial_response;
use crate::llm::types::{ChatMessage, CompletionParams, DEFAULT_CHAT_MAX_TOKENS};
use crate::llm::{ProviderKind, chat_backing_model};
use crate::services::chat::{self as chat_svc, ChatError};
use crate::state::AppState;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBody {
    pub conversation_id: Option<Uuid>,
    pub message: String,
    pub model: Option<String>,
    #[serde(default)]
    pub parameters: CompletionParams,
}

#[derive(Debug, Serialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub conversation_id: Uuid,
    pub message: String,
    pub model: String,
    pub tokens: TokenUsage,
}

pub(crate) fn chat_error_to_response(err: ChatError) -> Response {
    match err {
        ChatError::NotFound(_) => error_json(StatusCode::NOT_FOUND, "Conversation not found"),
        ChatError::Database(e) => {
            tracing::error!(error = %e, "conversation query failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process chat")
        }
    }
}

fn model_or_default(model: Option<&str>) -> String {
    model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_CHAT_MODEL)
        .to_string()
}

/// Check a chat turn before it is charged, returning the model to use.
fn validate_send(body: &SendBody) -> Result<String, &'static str> {
    if body.message.trim().is_empty() {
        return Err("Message is required");
    }
    let model = model_or_default(body.model.as_deref());
    if ProviderKind::for_model(&model).is_none() {
        return Err("model is not supported");
    }
    Ok(model)
}

/// `POST /api/chat`
pub async fn send(
    State(state): State<AppState>,
    auth: SessionAuth,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return error_json(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let model = match validate_send(&body) {
        Ok(model) => model,
        Err(message) => return error_json(StatusCode::BAD_REQUEST, message),
    };

    let account = auth.account;
    let now = OffsetDateTime::now_utc();
    let decision = state.gate.admit(account.id, &account.tier, now).await;
    if !decision.allowed {
        return denial_response(&decision, now);
    }

    let conversation_id =
        match chat_svc::resolve_conversation(&state.pool, account.id, body.conversation_id, &model, &body.message)
            .await
        {
            Ok(id) => id,
            Err(e) => return chat_error_to_response(e),
        };

    let mut messages = match chat_svc::load_history(&state.pool, conversation_id).await {
        Ok(history) => history,
        Err(e) => return chat_error_to_response(e),
    };
    messages.push(ChatMessage::user(body.message.clone()));

    if let Err(e) = chat_svc::store_user_message(&state.pool, conversation_id, &body.message).await {
        return chat_error_to_response(e);
    }

    let params = body.parameters.resolve(DEFAULT_CHAT_MAX_TOKENS);
    let reply = match state
        .llm
        .complete(chat_backing_model(&model), &messages, &params)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, %model, user_id = %account.id, "chat completion failed");
            return error_json(StatusCode::BAD_GATEWAY, &e.to_string());
        }
    };

    if let Err(e) = chat_svc::store_reply(&state.pool, conversation_id, &model, &reply).await {
        return chat_error_to_response(e);
    }

    let tokens = TokenUsage { prompt: reply.tokens_prompt, completion: reply.tokens_completion, total: reply.tokens_total() };
    Json(SendResponse { conversation_id, message: reply.text, model, tokens }).into_response()
}

/// `GET /api/chat/conversations`: newest 50.
pub async fn list_conversations(State(state): State<AppState>, auth: SessionAuth) -> Response {
    match chat_svc::list_conversations(&state.pool, auth.account.id).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => chat_error_to_response(e),
    }
}

/// `GET /api/chat/conversations/{id}`: conversation plus ordered messages.
pub async fn get_conversation(State(state): State<AppState>, auth: SessionAuth, Path(id): Path<Uuid>) -> Response {
    match chat_svc::get_conversation(&state.pool, id, auth.account.id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => chat_error_to_response(e),
    }
}

/// `DELETE /api/chat/conversations/{id}`
pub async fn delete_conversation(State(state): State<AppState>, auth: SessionAuth, Path(id): Path<Uuid>) -> Response {
    match chat_svc::delete_conversation(&state.pool, id, auth.account.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => chat_error_to_response(e),
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
