//! Request authentication extractors.
//!
//! ARCHITECTURE
//! ============
//! Programmatic clients send an API key in `x-api-key` and may only reach the
//! inference endpoints. Dashboard users send the session token issued by the
//! web front-end as `Authorization: Bearer <token>`. Both resolve to the same
//! `Account`, whose tier feeds the admission gate.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::Response;

use super::error_json;
use crate::services::session::{self, Account};
use crate::services::api_key;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub(crate) fn api_key_header(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}

// =============================================================================
// API KEY
// =============================================================================

/// Account resolved from an `x-api-key` header.
pub struct ApiKeyAuth {
    pub account: Account,
}

impl<S> FromRequestParts<S> for ApiKeyAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = api_key_header(parts) else {
            return Err(error_json(StatusCode::UNAUTHORIZED, "Invalid API key"));
        };

        let app_state = AppState::from_ref(state);
        match api_key::authenticate(&app_state.pool, raw).await {
            Ok(Some(account)) => Ok(Self { account }),
            Ok(None) => Err(error_json(StatusCode::UNAUTHORIZED, "Invalid API key")),
            Err(e) => {
                tracing::error!(error = %e, "api key lookup failed");
                Err(error_json(StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed"))
            }
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Account resolved from a bearer session token.
pub struct SessionAuth {
    pub account: Account,
}

impl<S> FromRequestParts<S> for SessionAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(error_json(StatusCode::UNAUTHORIZED, "Unauthorized"));
        };

        let app_state = AppState::from_ref(state);
        match session::validate_session(&app_state.pool, token).await {
            Ok(Some(account)) => Ok(Self { account }),
            Ok(None) => Err(error_json(StatusCode::UNAUTHORIZED, "Unauthorized")),
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed");
                Err(error_json(StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed"))
            }
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
