//! Concurrency admission check.
//!
//! The in-flight set is not stored anywhere on its own: it is the user's
//! `pending`/`processing` rows in the request log, which the dispatcher moves
//! through `pending → processing → completed | failed`. Rows whose work was
//! lost (process restart, failed outcome write) are released by
//! `release_stale`.

use time::OffsetDateTime;
use uuid::Uuid;

use super::store::{AdmissionStore, EnqueueOutcome, NewInferenceRequest, StoreError};
use super::tier::TierLimits;

/// A user at or above the cap gets no new request.
#[must_use]
pub fn at_capacity(in_flight: i64, limits: TierLimits) -> bool {
    in_flight >= limits.max_concurrent
}

/// Live count of the user's in-flight requests.
///
/// # Errors
///
/// Returns the store's error unchanged.
pub async fn count_in_flight(store: &dyn AdmissionStore, user_id: Uuid) -> Result<i64, StoreError> {
    store.count_in_flight(user_id).await
}

/// Check the cap and log `request` as `pending` in one atomic store call.
///
/// # Errors
///
/// Returns the store's error unchanged.
pub async fn enqueue_within_cap(
    store: &dyn AdmissionStore,
    user_id: Uuid,
    limits: TierLimits,
    request: &NewInferenceRequest,
) -> Result<EnqueueOutcome, StoreError> {
    store
        .enqueue_if_below(user_id, limits.max_concurrent, request)
        .await
}

/// Fail every in-flight row created before `cutoff`, freeing its slot.
///
/// # Errors
///
/// Returns the store's error unchanged.
pub async fn release_stale(store: &dyn AdmissionStore, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError> {
    store.fail_in_flight_before(cutoff, reason).await
}
