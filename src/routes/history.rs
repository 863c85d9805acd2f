//! Inference history for the dashboard.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::SessionAuth;
use super::inference::inference_error_to_response;
use crate::services::inference as inference_svc;
use crate::state::AppState;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl HistoryQuery {
    /// `(limit, offset)` with defaults applied and the limit clamped.
    #[must_use]
    pub fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// `GET /api/history?limit&offset`: newest first.
pub async fn list(State(state): State<AppState>, auth: SessionAuth, Query(query): Query<HistoryQuery>) -> Response {
    let (limit, offset) = query.page();
    match inference_svc::list_history(&state.pool, auth.account.id, limit, offset).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => inference_error_to_response(e),
    }
}

/// `DELETE /api/history/{id}`: finished rows only, 409 while in flight.
pub async fn remove(State(state): State<AppState>, auth: SessionAuth, Path(id): Path<Uuid>) -> Response {
    match inference_svc::delete_request(&state.pool, id, auth.account.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => inference_error_to_response(e),
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
