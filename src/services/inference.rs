//! Inference request log: reads, status transitions and the daily usage rollup.
//!
//! SYSTEM CONTEXT
//! ==============
//! Rows are created only by the admission gate (`pending`). The dispatcher
//! moves them to `processing` and then `completed` or `failed`; owners can
//! read their own rows and delete the finished ones. An in-flight row holds a
//! concurrency slot, so it cannot be deleted, and outcome writes only apply
//! to rows that are still in flight (a row failed by the stale sweep stays
//! failed).

use serde::Serialize;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a logged inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Counts against the user's concurrency cap.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference request not found: {0}")]
    NotFound(Uuid),
    #[error("inference request still in flight: {0}")]
    InFlight(Uuid),
    #[error("unexpected request status: {0}")]
    BadStatus(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Full request row as returned to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRecord {
    pub id: Uuid,
    pub model: String,
    pub prompt: String,
    pub response: Option<String>,
    pub status: RequestStatus,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    pub tokens_total: Option<i64>,
    pub processing_time_ms: Option<i64>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// History list entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prompt: String,
    pub response: Option<String>,
    pub model: String,
    pub status: RequestStatus,
    pub tokens_used: Option<i64>,
    pub processing_time: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Outcome of a finished provider call, written back by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedInference {
    pub response: String,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub processing_time_ms: i64,
}

impl CompletedInference {
    #[must_use]
    pub fn tokens_total(&self) -> i64 {
        self.tokens_prompt.saturating_add(self.tokens_completion)
    }
}

fn parse_status(raw: &str) -> Result<RequestStatus, InferenceError> {
    RequestStatus::from_str(raw).ok_or_else(|| InferenceError::BadStatus(raw.to_owned()))
}

/// Fetch one request owned by `user_id`.
pub async fn get_request(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<InferenceRecord, InferenceError> {
    let row = sqlx::query(
        r"SELECT id, model, prompt, response, status, tokens_prompt, tokens_completion,
                 tokens_total, processing_time_ms, error_message, created_at, completed_at
          FROM inference_requests
          WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(InferenceError::NotFound(id))?;

    let status: String = row.get("status");
    Ok(InferenceRecord {
        id: row.get("id"),
        model: row.get("model"),
        prompt: row.get("prompt"),
        response: row.get("response"),
        status: parse_status(&status)?,
        tokens_prompt: row.get("tokens_prompt"),
        tokens_completion: row.get("tokens_completion"),
        tokens_total: row.get("tokens_total"),
        processing_time_ms: row.get("processing_time_ms"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

/// Newest-first page of the user's requests.
pub async fn list_history(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<HistoryEntry>, InferenceError> {
    let rows = sqlx::query(
        r"SELECT id, prompt, response, model, status, tokens_total, processing_time_ms, created_at
          FROM inference_requests
          WHERE user_id = $1
          ORDER BY created_at DESC
          LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let status: String = r.get("status");
            Ok(HistoryEntry {
                id: r.get("id"),
                prompt: r.get("prompt"),
                response: r.get("response"),
                model: r.get("model"),
                status: parse_status(&status)?,
                tokens_used: r.get("tokens_total"),
                processing_time: r.get("processing_time_ms"),
                created_at: r.get("created_at"),
            })
        })
        .collect()
}

/// Delete one of the user's finished requests.
///
/// # Errors
///
/// `InFlight` when the row is still `pending`/`processing`, `NotFound` when
/// the user has no such row.
pub async fn delete_request(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<(), InferenceError> {
    let deleted = sqlx::query(
        r"DELETE FROM inference_requests
          WHERE id = $1 AND user_id = $2 AND status IN ('completed', 'failed')
          RETURNING id",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    if deleted.is_some() {
        return Ok(());
    }

    let status: Option<String> = sqlx::query_scalar("SELECT status FROM inference_requests WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    match status {
        Some(_) => Err(InferenceError::InFlight(id)),
        None => Err(InferenceError::NotFound(id)),
    }
}

/// Claim a `pending` row for processing. `false` means the row is gone or
/// already settled and the job must not run.
pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<bool, InferenceError> {
    let result = sqlx::query("UPDATE inference_requests SET status = 'processing' WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Record a successful outcome. `false` when the row was no longer in flight.
pub async fn mark_completed(pool: &PgPool, id: Uuid, done: &CompletedInference) -> Result<bool, InferenceError> {
    let result = sqlx::query(
        r"UPDATE inference_requests
          SET status = 'completed', response = $2, tokens_prompt = $3, tokens_completion = $4,
              tokens_total = $5, processing_time_ms = $6, completed_at = now()
          WHERE id = $1 AND status IN ('pending', 'processing')",
    )
    .bind(id)
    .bind(&done.response)
    .bind(done.tokens_prompt)
    .bind(done.tokens_completion)
    .bind(done.tokens_total())
    .bind(done.processing_time_ms)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_failed(pool: &PgPool, id: Uuid, message: &str) -> Result<(), InferenceError> {
    sqlx::query(
        r"UPDATE inference_requests
          SET status = 'failed', error_message = $2, completed_at = now()
          WHERE id = $1 AND status IN ('pending', 'processing')",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fold one successful request into the user's daily usage row.
///
/// `models_used` keeps a per-model request count; the average response time
/// is a running mean over `total_requests`.
#[allow(clippy::cast_precision_loss)]
pub async fn record_usage(
    pool: &PgPool,
    user_id: Uuid,
    model: &str,
    done: &CompletedInference,
) -> Result<(), InferenceError> {
    sqlx::query(
        r"INSERT INTO usage_statistics
              (user_id, date, total_requests, successful_requests, total_tokens, avg_response_time_ms, models_used)
          VALUES ($1, CURRENT_DATE, 1, 1, $2, $3, jsonb_build_object($4::text, 1))
          ON CONFLICT (user_id, date) DO UPDATE SET
              total_requests = usage_statistics.total_requests + 1,
              successful_requests = usage_statistics.successful_requests + 1,
              total_tokens = usage_statistics.total_tokens + $2,
              avg_response_time_ms = (usage_statistics.avg_response_time_ms * usage_statistics.total_requests + $3)
                                     / (usage_statistics.total_requests + 1),
              models_used = usage_statistics.models_used || jsonb_build_object(
                  $4::text, COALESCE((usage_statistics.models_used ->> $4::text)::bigint, 0) + 1)",
    )
    .bind(user_id)
    .bind(done.tokens_total())
    .bind(done.processing_time_ms as f64)
    .bind(model)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "inference_test.rs"]
mod tests;
