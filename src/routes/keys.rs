//! API key management for the dashboard.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::SessionAuth;
use super::error_json;
use crate::services::api_key::{self, ApiKeyError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
    pub name: String,
}

pub(crate) fn api_key_error_to_response(err: ApiKeyError) -> Response {
    match err {
        ApiKeyError::NotFound(_) => error_json(StatusCode::NOT_FOUND, "API key not found"),
        ApiKeyError::InvalidName => error_json(StatusCode::BAD_REQUEST, "Name must be 1 to 100 characters"),
        ApiKeyError::Database(e) => {
            tracing::error!(error = %e, "api key query failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to manage API keys")
        }
    }
}

/// `POST /api/keys`: the raw key appears only in this response.
pub async fn create(State(state): State<AppState>, auth: SessionAuth, Json(body): Json<CreateKeyBody>) -> Response {
    match api_key::create_key(&state.pool, auth.account.id, &body.name).await {
        Ok(created) => {
            tracing::info!(user_id = %auth.account.id, key_id = %created.id, "api key created");
            (StatusCode::CREATED, Json(created)).into_response()
        }
        Err(e) => api_key_error_to_response(e),
    }
}

/// `GET /api/keys`
pub async fn list(State(state): State<AppState>, auth: SessionAuth) -> Response {
    match api_key::list_keys(&state.pool, auth.account.id).await {
        Ok(keys) => Json(keys).into_response(),
        Err(e) => api_key_error_to_response(e),
    }
}

/// `DELETE /api/keys/{id}`: revoke.
pub async fn revoke(State(state): State<AppState>, auth: SessionAuth, Path(id): Path<Uuid>) -> Response {
    match api_key::revoke_key(&state.pool, id, auth.account.id).await {
        Ok(()) => {
            tracing::info!(user_id = %auth.account.id, key_id = %id, "api key revoked");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => api_key_error_to_response(e),
    }
}

#[cfg(test)]
#[path = "keys_test.rs"]
mod tests;
