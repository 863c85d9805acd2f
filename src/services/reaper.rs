//! Background maintenance of admission state.
//!
//! Two sweeps share one ticker:
//!
//! - Rate buckets. Every admission writes one bucket row per user per minute.
//!   Rows are never read again once their window has closed, so buckets whose
//!   `expires_at` is older than the grace period are deleted.
//! - Stale in-flight requests. A `pending`/`processing` row whose outcome was
//!   never written (failed write, lost task) would hold one of its user's
//!   concurrency slots forever. Rows older than the stale threshold are marked
//!   `failed`. The threshold must exceed the provider timeout plus the longest
//!   expected dispatch queue wait.
//!
//! At start-up, `recover_interrupted_requests` fails every in-flight row
//! created before the process started: the tasks that owned them are gone.
//! This assumes one dispatcher process per database.

use std::time::Duration;

use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::AdmissionGate;
use crate::admission::store::StoreError;

pub const STALE_REQUEST_REASON: &str = "request abandoned: no outcome recorded";
pub const RESTART_REASON: &str = "request interrupted by server restart";

#[derive(Debug, Clone, Copy)]
pub struct ReaperSettings {
    pub interval: Duration,
    /// How long past `expires_at` a rate bucket is kept.
    pub bucket_grace: Duration,
    /// Age after which an in-flight request is failed.
    pub stale_after: Duration,
}

/// Spawn the periodic sweeps.
pub fn spawn_reaper(pool: PgPool, gate: AdmissionGate, settings: ReaperSettings) -> JoinHandle<()> {
    info!(
        interval_secs = settings.interval.as_secs(),
        grace_secs = settings.bucket_grace.as_secs(),
        stale_after_secs = settings.stale_after.as_secs(),
        "reaper configured"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match reap_expired_buckets(&pool, settings.bucket_grace).await {
                Ok(0) => {}
                Ok(n) => debug!(deleted = n, "reaped expired rate buckets"),
                Err(e) => warn!(error = %e, "rate bucket reap failed"),
            }
            match fail_stale_requests(&gate, OffsetDateTime::now_utc(), settings.stale_after).await {
                Ok(0) => {}
                Ok(n) => warn!(released = n, "failed stale in-flight requests"),
                Err(e) => warn!(error = %e, "stale request sweep failed"),
            }
        }
    })
}

/// Delete buckets whose window ended more than `grace` ago.
///
/// # Errors
///
/// Returns the database error if the delete fails.
pub async fn reap_expired_buckets(pool: &PgPool, grace: Duration) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM rate_limit_buckets WHERE expires_at < now() - $1::interval")
        .bind(grace_interval(grace))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Fail in-flight requests created more than `stale_after` before `now`.
///
/// # Errors
///
/// Returns the store error if the update fails.
pub async fn fail_stale_requests(
    gate: &AdmissionGate,
    now: OffsetDateTime,
    stale_after: Duration,
) -> Result<u64, StoreError> {
    let Some(cutoff) = time::Duration::try_from(stale_after)
        .ok()
        .and_then(|age| now.checked_sub(age))
    else {
        return Ok(0);
    };
    gate.release_stale(cutoff, STALE_REQUEST_REASON).await
}

/// Fail every in-flight request created before `started_at`.
///
/// # Errors
///
/// Returns the store error if the update fails.
pub async fn recover_interrupted_requests(gate: &AdmissionGate, started_at: OffsetDateTime) -> Result<u64, StoreError> {
    gate.release_stale(started_at, RESTART_REASON).await
}

/// Postgres interval literal for `grace`, e.g. `3600 seconds`.
fn grace_interval(grace: Duration) -> String {
    format!("{} seconds", grace.as_secs())
}

#[cfg(test)]
#[path = "reaper_test.rs"]
mod tests;
