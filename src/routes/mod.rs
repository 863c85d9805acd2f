//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the inference API (API-key auth) and the dashboard API (session
//! auth) under a single Axum router with CORS and request tracing. Every
//! error body is `{"error": "..."}`.

pub mod auth;
pub mod chat;
pub mod history;
pub mod inference;
pub mod keys;
pub mod rate_limit;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/inference", post(inference::submit))
        .route("/api/inference/{id}", get(inference::get_request))
        .route("/api/inference/{id}/result", get(inference::get_result))
        .route("/api/rate-limit", get(rate_limit::usage))
        .route("/api/history", get(history::list))
        .route("/api/history/{id}", delete(history::remove))
        .route("/api/keys", get(keys::list).post(keys::create))
        .route("/api/keys/{id}", delete(keys::revoke))
        .route("/api/chat", post(chat::send))
        .route("/api/chat/conversations", get(chat::list_conversations))
        .route(
            "/api/chat/conversations/{id}",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `{"error": message}` with the given status.
pub(crate) fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
