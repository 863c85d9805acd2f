//! `GET /api/rate-limit`: the caller's standing against their tier.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use time::OffsetDateTime;

use super::auth::SessionAuth;
use super::error_json;
use crate::state::AppState;

/// Read-only; does not charge the per-minute window.
pub async fn usage(State(state): State<AppState>, auth: SessionAuth) -> Response {
    let account = auth.account;
    match state
        .gate
        .usage(account.id, &account.tier, OffsetDateTime::now_utc())
        .await
    {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            tracing::error!(error = %e, user_id = %account.id, "rate limit status unavailable");
            error_json(StatusCode::SERVICE_UNAVAILABLE, "Failed to get rate limit info")
        }
    }
}
