//! API key issue, listing, revocation and authentication.
//!
//! TRADE-OFFS
//! ==========
//! Keys are 32 random bytes, so a fast unsalted SHA-256 digest is enough to
//! make the stored column useless to an attacker, and it lets authentication
//! look a key up by digest instead of comparing against every active row.
//! The raw key is shown to the owner exactly once, at creation.

use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use super::session::{Account, bytes_to_hex, generate_token};

const KEY_PREFIX: &str = "sk_";
/// Characters of the raw key kept in clear for display.
const DISPLAY_PREFIX_LEN: usize = 11;
const MAX_KEY_NAME_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("api key not found: {0}")]
    NotFound(Uuid),
    #[error("invalid key name")]
    InvalidName,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Returned once, at creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedKey {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub prefix: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[must_use]
pub fn generate_api_key() -> String {
    format!("{KEY_PREFIX}{}", generate_token())
}

/// Hex SHA-256 of the raw key, as stored in `api_keys.key_hash`.
#[must_use]
pub fn hash_api_key(raw: &str) -> String {
    bytes_to_hex(&Sha256::digest(raw.as_bytes()))
}

fn display_prefix(raw: &str) -> String {
    raw.chars().take(DISPLAY_PREFIX_LEN).collect()
}

fn normalize_name(name: &str) -> Result<String, ApiKeyError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_KEY_NAME_LEN {
        return Err(ApiKeyError::InvalidName);
    }
    Ok(trimmed.to_owned())
}

/// Resolve a raw key to its active, unexpired owner and touch `last_used_at`.
pub async fn authenticate(pool: &PgPool, raw: &str) -> Result<Option<Account>, ApiKeyError> {
    if !raw.starts_with(KEY_PREFIX) {
        return Ok(None);
    }

    let row = sqlx::query(
        r"UPDATE api_keys ak
          SET last_used_at = now()
          FROM users u
          WHERE ak.key_hash = $1
            AND ak.user_id = u.id
            AND ak.status = 'active'
            AND (ak.expires_at IS NULL OR ak.expires_at > now())
            AND u.status = 'active'
          RETURNING u.id, u.email, u.subscription_tier",
    )
    .bind(hash_api_key(raw))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Account { id: r.get("id"), email: r.get("email"), tier: r.get("subscription_tier") }))
}

pub async fn create_key(pool: &PgPool, user_id: Uuid, name: &str) -> Result<CreatedKey, ApiKeyError> {
    let name = normalize_name(name)?;
    let key = generate_api_key();
    let prefix = display_prefix(&key);

    let row = sqlx::query(
        r"INSERT INTO api_keys (user_id, name, key_prefix, key_hash)
          VALUES ($1, $2, $3, $4)
          RETURNING id, created_at",
    )
    .bind(user_id)
    .bind(&name)
    .bind(&prefix)
    .bind(hash_api_key(&key))
    .fetch_one(pool)
    .await?;

    Ok(CreatedKey { id: row.get("id"), name, key, prefix, created_at: row.get("created_at") })
}

pub async fn list_keys(pool: &PgPool, user_id: Uuid) -> Result<Vec<KeySummary>, ApiKeyError> {
    let rows = sqlx::query(
        r"SELECT id, name, key_prefix, status, last_used_at, created_at
          FROM api_keys
          WHERE user_id = $1
          ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| KeySummary {
            id: r.get("id"),
            name: r.get("name"),
            prefix: r.get("key_prefix"),
            status: r.get("status"),
            last_used_at: r.get("last_used_at"),
            created_at: r.get("created_at"),
        })
        .collect())
}

pub async fn revoke_key(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<(), ApiKeyError> {
    let updated = sqlx::query("UPDATE api_keys SET status = 'revoked' WHERE id = $1 AND user_id = $2 RETURNING id")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if updated.is_none() {
        return Err(ApiKeyError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
#[path = "api_key_test.rs"]
mod tests;
