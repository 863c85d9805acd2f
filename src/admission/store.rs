//! Backing store for the admission gate.
//!
//! ARCHITECTURE
//! ============
//! The gate talks to persistence only through `AdmissionStore`, so it can run
//! against Postgres in production and an in-memory fake in tests. The
//! Postgres implementation owns a clone of the process-wide pool handed in at
//! start-up.
//!
//! ATOMICITY
//! =========
//! - `increment_bucket` is one `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//!   statement; Postgres row locking serializes concurrent increments.
//! - `enqueue_if_below` takes a per-user transaction-scoped advisory lock,
//!   counts in-flight rows and inserts the new `pending` row in the same
//!   transaction. Two admissions for the same user cannot both observe
//!   `cap - 1` and both insert. Status transitions made by the dispatcher do
//!   not take the lock; they only ever shrink the in-flight set.
//!
//! RECOVERY
//! ========
//! A `pending` row can outlive the work it stands for: the gate may give up
//! on an insert that commits after its deadline, an outcome write may fail,
//! or the process may die with jobs queued. `discard_pending` and
//! `fail_in_flight_before` are the two ways such rows leave the in-flight set.

use std::time::Duration;

use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use super::window::Window;

/// Namespace for `pg_advisory_xact_lock(int4, int4)` so admission locks never
/// collide with other advisory lock users.
const ADMISSION_LOCK_NAMESPACE: i32 = 0x5241_5445;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connect, I/O, pool exhaustion).
    #[error("admission store unavailable: {0}")]
    Unavailable(String),
    /// A store call did not finish within the gate's deadline.
    #[error("admission store timed out after {0:?}")]
    Timeout(Duration),
    /// The store was reachable but the statement failed.
    #[error("admission store query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// A new inference request to be logged as `pending` if admitted.
#[derive(Debug, Clone)]
pub struct NewInferenceRequest {
    pub model: String,
    pub prompt: String,
    pub parameters: serde_json::Value,
}

/// The row created for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(PendingRequest),
    /// Nothing was written.
    AtCapacity { in_flight: i64 },
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Insert-or-increment the user's counter for `window`, returning the
    /// post-increment count.
    async fn increment_bucket(&self, user_id: Uuid, window: &Window) -> Result<i64, StoreError>;

    /// Current count for `window`, `None` if no request has been recorded.
    async fn read_bucket(&self, user_id: Uuid, window: &Window) -> Result<Option<i64>, StoreError>;

    /// Number of the user's requests in `pending` or `processing`.
    async fn count_in_flight(&self, user_id: Uuid) -> Result<i64, StoreError>;

    /// Insert `request` as `pending` only if the user has fewer than
    /// `max_concurrent` requests in flight, as one atomic step.
    async fn enqueue_if_below(
        &self,
        user_id: Uuid,
        max_concurrent: i64,
        request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError>;

    /// Delete `request_id` if it is still `pending`. Returns whether a row
    /// was removed.
    async fn discard_pending(&self, request_id: Uuid) -> Result<bool, StoreError>;

    /// Mark every `pending`/`processing` row created before `cutoff` as
    /// `failed` with `reason`, returning how many rows were released.
    async fn fail_in_flight_before(&self, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

#[derive(Clone)]
pub struct PgAdmissionStore {
    pool: PgPool,
}

impl PgAdmissionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AdmissionStore for PgAdmissionStore {
    async fn increment_bucket(&self, user_id: Uuid, window: &Window) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO rate_limit_buckets (user_id, bucket_type, bucket_key, request_count, expires_at)
              VALUES ($1, $2, $3, 1, $4)
              ON CONFLICT (user_id, bucket_type, bucket_key)
              DO UPDATE SET request_count = rate_limit_buckets.request_count + 1
              RETURNING request_count",
        )
        .bind(user_id)
        .bind(window.bucket_type)
        .bind(&window.key)
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("request_count"))
    }

    async fn read_bucket(&self, user_id: Uuid, window: &Window) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "SELECT request_count FROM rate_limit_buckets
             WHERE user_id = $1 AND bucket_type = $2 AND bucket_key = $3",
        )
        .bind(user_id)
        .bind(window.bucket_type)
        .bind(&window.key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("request_count")))
    }

    async fn count_in_flight(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS in_flight FROM inference_requests
             WHERE user_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("in_flight"))
    }

    async fn enqueue_if_below(
        &self,
        user_id: Uuid,
        max_concurrent: i64,
        request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Held until commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(ADMISSION_LOCK_NAMESPACE)
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        let in_flight: i64 = sqlx::query(
            "SELECT COUNT(*) AS in_flight FROM inference_requests
             WHERE user_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?
        .get("in_flight");

        if in_flight >= max_concurrent {
            tx.rollback().await?;
            return Ok(EnqueueOutcome::AtCapacity { in_flight });
        }

        let row = sqlx::query(
            r"INSERT INTO inference_requests (user_id, model, prompt, status, parameters)
              VALUES ($1, $2, $3, 'pending', $4)
              RETURNING id, created_at",
        )
        .bind(user_id)
        .bind(&request.model)
        .bind(&request.prompt)
        .bind(&request.parameters)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(EnqueueOutcome::Enqueued(PendingRequest { id: row.get("id"), created_at: row.get("created_at") }))
    }

    async fn discard_pending(&self, request_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM inference_requests WHERE id = $1 AND status = 'pending'")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_in_flight_before(&self, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r"UPDATE inference_requests
              SET status = 'failed', error_message = $2, completed_at = now()
              WHERE status IN ('pending', 'processing') AND created_at < $1",
        )
        .bind(cutoff)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
