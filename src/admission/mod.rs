//! Admission gate for paid inference.
//!
//! DESIGN
//! ======
//! Two checks run in a fixed order before a request may reach a provider:
//!
//! 1. the per-minute rate counter (one upsert; cheapest, runs first), then
//! 2. the concurrency cap over the user's in-flight requests.
//!
//! The rate counter is charged even when the concurrency check later denies,
//! so a user pinned at their concurrency cap still burns through their
//! per-minute budget by retrying.
//!
//! ERROR HANDLING
//! ==============
//! Nothing escapes the gate as an error. Store failures and timeouts become a
//! deny with no `limitType` and zero limit (fail closed): an outage must never
//! turn into unlimited paid traffic. Unknown tiers get free-tier limits.
//!
//! The check-and-insert runs on its own task. When the deadline fires first
//! (or the caller goes away), the caller is denied at once and a follow-up
//! task waits for the insert; if it did commit, the orphaned `pending` row is
//! discarded so the denial leaves no trace in the request log.

pub mod concurrency;
#[cfg(test)]
pub mod memory;
pub mod store;
pub mod tier;
pub mod window;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use store::{AdmissionStore, EnqueueOutcome, NewInferenceRequest, PendingRequest, StoreError};
use tier::{Tier, TierLimitTable, TierLimits};
use window::RateCount;

// =============================================================================
// DECISION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Rate,
    Concurrency,
}

/// Outcome of one admission attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// Which limit denied the request; absent when allowed or when the gate
    /// could not decide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_type: Option<LimitType>,
    pub limit: i64,
    pub remaining: i64,
    /// End of the current rate window. `None` for concurrency denials, which
    /// have no fixed reset instant.
    #[serde(with = "time::serde::rfc3339::option")]
    pub reset_time: Option<OffsetDateTime>,
}

impl AdmissionDecision {
    fn allowed(limits: TierLimits, rate: RateCount) -> Self {
        Self {
            allowed: true,
            limit_type: None,
            limit: limits.requests_per_window,
            remaining: rate.remaining(limits),
            reset_time: Some(rate.window_end),
        }
    }

    fn rate_exceeded(limits: TierLimits, rate: RateCount) -> Self {
        Self {
            allowed: false,
            limit_type: Some(LimitType::Rate),
            limit: limits.requests_per_window,
            remaining: 0,
            reset_time: Some(rate.window_end),
        }
    }

    fn concurrency_exceeded(limits: TierLimits) -> Self {
        Self {
            allowed: false,
            limit_type: Some(LimitType::Concurrency),
            limit: limits.max_concurrent,
            remaining: 0,
            reset_time: None,
        }
    }

    /// Deny issued when the store could not be consulted.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { allowed: false, limit_type: None, limit: 0, remaining: 0, reset_time: None }
    }

    /// Whole seconds until `reset_time`, at least 1. `None` when there is no
    /// reset instant.
    #[must_use]
    pub fn retry_after_secs(&self, now: OffsetDateTime) -> Option<u64> {
        let reset = self.reset_time?;
        let millis = u128::try_from((reset - now).whole_milliseconds()).unwrap_or(0);
        let secs = u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX);
        Some(secs.max(1))
    }
}

/// Result of `admit_and_enqueue`: the decision plus the request row created
/// when it was allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub decision: AdmissionDecision,
    pub request: Option<PendingRequest>,
}

impl Admission {
    fn denied(decision: AdmissionDecision) -> Self {
        Self { decision, request: None }
    }
}

/// Read-only view of a user's standing against their tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub tier: Tier,
    pub requests_per_minute: i64,
    pub requests_remaining: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub reset_time: OffsetDateTime,
    pub concurrent_requests: i64,
    pub max_concurrent_requests: i64,
}

// =============================================================================
// GATE
// =============================================================================

/// Shared admission gate. Cheap to clone.
#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn AdmissionStore>,
    tiers: TierLimitTable,
    store_timeout: Duration,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(store: Arc<dyn AdmissionStore>, tiers: TierLimitTable, store_timeout: Duration) -> Self {
        Self { store, tiers, store_timeout }
    }

    #[must_use]
    pub fn limits_for(&self, tier: &str) -> (Tier, TierLimits) {
        let tier = Tier::resolve(tier);
        (tier, self.tiers.limits(tier))
    }

    /// Charge the rate counter and check the concurrency cap.
    ///
    /// Does not log a request: callers that run work outside the request log
    /// (chat) use this directly. Callers that enqueue must use
    /// [`AdmissionGate::admit_and_enqueue`] so the cap check and the insert
    /// are one step.
    pub async fn admit(&self, user_id: Uuid, tier: &str, now: OffsetDateTime) -> AdmissionDecision {
        let (_, limits) = self.limits_for(tier);
        match self.try_admit(user_id, limits, now).await {
            Ok(decision) => decision,
            Err(e) => Self::fail_closed(user_id, &e),
        }
    }

    /// Charge the rate counter, then log `request` as `pending` only if the
    /// user is below the concurrency cap. A denied admission writes nothing to
    /// the request log.
    pub async fn admit_and_enqueue(
        &self,
        user_id: Uuid,
        tier: &str,
        now: OffsetDateTime,
        request: &NewInferenceRequest,
    ) -> Admission {
        let (_, limits) = self.limits_for(tier);
        match self
            .try_admit_and_enqueue(user_id, limits, now, request)
            .await
        {
            Ok(admission) => admission,
            Err(e) => Admission::denied(Self::fail_closed(user_id, &e)),
        }
    }

    /// Current standing without charging the window.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store fails or times out.
    pub async fn usage(&self, user_id: Uuid, tier: &str, now: OffsetDateTime) -> Result<UsageSnapshot, StoreError> {
        let (tier, limits) = self.limits_for(tier);
        let rate = self
            .bounded(window::peek(self.store.as_ref(), user_id, now))
            .await?;
        let in_flight = self
            .bounded(concurrency::count_in_flight(self.store.as_ref(), user_id))
            .await?;
        Ok(UsageSnapshot {
            tier,
            requests_per_minute: limits.requests_per_window,
            requests_remaining: rate.remaining(limits),
            reset_time: rate.window_end,
            concurrent_requests: in_flight,
            max_concurrent_requests: limits.max_concurrent,
        })
    }

    async fn try_admit(
        &self,
        user_id: Uuid,
        limits: TierLimits,
        now: OffsetDateTime,
    ) -> Result<AdmissionDecision, StoreError> {
        let rate = self.charge_rate(user_id, now).await?;
        if rate.exceeds(limits) {
            tracing::info!(%user_id, count = rate.count, limit = limits.requests_per_window, "rate limit exceeded");
            return Ok(AdmissionDecision::rate_exceeded(limits, rate));
        }

        let in_flight = self
            .bounded(concurrency::count_in_flight(self.store.as_ref(), user_id))
            .await?;
        if concurrency::at_capacity(in_flight, limits) {
            tracing::info!(%user_id, in_flight, limit = limits.max_concurrent, "concurrency limit reached");
            return Ok(AdmissionDecision::concurrency_exceeded(limits));
        }

        Ok(AdmissionDecision::allowed(limits, rate))
    }

    async fn try_admit_and_enqueue(
        &self,
        user_id: Uuid,
        limits: TierLimits,
        now: OffsetDateTime,
        request: &NewInferenceRequest,
    ) -> Result<Admission, StoreError> {
        let rate = self.charge_rate(user_id, now).await?;
        if rate.exceeds(limits) {
            tracing::info!(%user_id, count = rate.count, limit = limits.requests_per_window, "rate limit exceeded");
            return Ok(Admission::denied(AdmissionDecision::rate_exceeded(limits, rate)));
        }

        let outcome = self.enqueue_bounded(user_id, limits, request).await?;
        match outcome {
            EnqueueOutcome::Enqueued(pending) => {
                Ok(Admission { decision: AdmissionDecision::allowed(limits, rate), request: Some(pending) })
            }
            EnqueueOutcome::AtCapacity { in_flight } => {
                tracing::info!(%user_id, in_flight, limit = limits.max_concurrent, "concurrency limit reached");
                Ok(Admission::denied(AdmissionDecision::concurrency_exceeded(limits)))
            }
        }
    }

    async fn charge_rate(&self, user_id: Uuid, now: OffsetDateTime) -> Result<RateCount, StoreError> {
        self.bounded(window::record_and_check(self.store.as_ref(), user_id, now))
            .await
    }

    /// Release in-flight rows created before `cutoff` by marking them failed.
    /// Not bounded by the admission deadline: this is a maintenance sweep.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store fails.
    pub async fn release_stale(&self, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError> {
        concurrency::release_stale(self.store.as_ref(), cutoff, reason).await
    }

    /// Check-and-insert under the gate's deadline.
    async fn enqueue_bounded(
        &self,
        user_id: Uuid,
        limits: TierLimits,
        request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        let store = Arc::clone(&self.store);
        let request = request.clone();
        let task = tokio::spawn(async move {
            concurrency::enqueue_within_cap(store.as_ref(), user_id, limits, &request).await
        });
        InsertInFlight { task: Some(task), store: Arc::clone(&self.store), user_id }
            .wait(self.store_timeout)
            .await
    }

    /// Run one store call under the gate's deadline.
    async fn bounded<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))?
    }

    fn fail_closed(user_id: Uuid, err: &StoreError) -> AdmissionDecision {
        tracing::error!(%user_id, error = %err, "admission store failure; denying request");
        AdmissionDecision::unavailable()
    }
}

// =============================================================================
// ABANDONED INSERTS
// =============================================================================

/// A check-and-insert running on its own task. Dropped before its outcome
/// was taken (deadline hit, or the caller's future was cancelled), it hands
/// the task to a follow-up that discards the row if the insert committed.
struct InsertInFlight {
    task: Option<JoinHandle<Result<EnqueueOutcome, StoreError>>>,
    store: Arc<dyn AdmissionStore>,
    user_id: Uuid,
}

impl InsertInFlight {
    async fn wait(mut self, deadline: Duration) -> Result<EnqueueOutcome, StoreError> {
        let Some(task) = self.task.as_mut() else {
            return Err(StoreError::Unavailable("admission insert already taken".into()));
        };
        let joined = tokio::time::timeout(deadline, task)
            .await
            .map_err(|_| StoreError::Timeout(deadline))?;
        self.task = None;
        joined.map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

impl Drop for InsertInFlight {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else { return };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else { return };
        let store = Arc::clone(&self.store);
        let user_id = self.user_id;
        runtime.spawn(async move {
            if let Ok(Ok(EnqueueOutcome::Enqueued(pending))) = task.await {
                discard_abandoned(store.as_ref(), user_id, pending.id).await;
            }
        });
    }
}

async fn discard_abandoned(store: &dyn AdmissionStore, user_id: Uuid, request_id: Uuid) {
    match store.discard_pending(request_id).await {
        Ok(true) => tracing::warn!(%user_id, %request_id, "admission insert committed after deadline; row discarded"),
        Ok(false) => {}
        Err(e) => tracing::error!(%user_id, %request_id, error = %e, "failed to discard abandoned pending row"),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
