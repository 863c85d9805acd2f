//! Session-token validation for the dashboard API.
//!
//! ARCHITECTURE
//! ============
//! Sessions are issued by the web front-end at sign-in; this service only
//! resolves a bearer token to an active account. API clients authenticate
//! with API keys instead (see `api_key`).

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// An authenticated, active account.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    /// Raw `subscription_tier` column; resolved against the tier table at
    /// admission time.
    pub tier: String,
}

/// Resolve a session token to its account. Expired sessions and inactive
/// users resolve to `None`.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<Account>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.email, u.subscription_tier
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now() AND u.status = 'active'",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Account { id: r.get("id"), email: r.get("email"), tier: r.get("subscription_tier") }))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
