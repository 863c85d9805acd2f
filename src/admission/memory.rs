//! In-memory `AdmissionStore` fakes for tests.
//!
//! `MemoryStore` keeps the same atomicity contract as Postgres by doing each
//! trait call under one mutex. `FailingStore` and `StallingStore` simulate an
//! unreachable and a hung backend; `SlowCommitStore` writes its insert and
//! only then stalls, like a commit whose reply arrives late.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use super::store::{AdmissionStore, EnqueueOutcome, NewInferenceRequest, PendingRequest, StoreError};
use super::window::Window;
use crate::services::inference::RequestStatus;

type BucketKey = (Uuid, &'static str, String);

struct LoggedRequest {
    user_id: Uuid,
    status: RequestStatus,
    created_at: OffsetDateTime,
    error_message: Option<String>,
}

#[derive(Default)]
struct Inner {
    buckets: HashMap<BucketKey, (i64, OffsetDateTime)>,
    requests: HashMap<Uuid, LoggedRequest>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a request row directly, bypassing admission.
    pub fn seed_request(&self, user_id: Uuid, status: RequestStatus) -> Uuid {
        self.seed_request_at(user_id, status, OffsetDateTime::now_utc())
    }

    /// Insert a request row with an explicit creation time.
    pub fn seed_request_at(&self, user_id: Uuid, status: RequestStatus, created_at: OffsetDateTime) -> Uuid {
        let id = Uuid::new_v4();
        self.lock()
            .requests
            .insert(id, LoggedRequest { user_id, status, created_at, error_message: None });
        id
    }

    #[must_use]
    pub fn status_of(&self, id: Uuid) -> Option<RequestStatus> {
        self.lock().requests.get(&id).map(|r| r.status)
    }

    #[must_use]
    pub fn error_of(&self, id: Uuid) -> Option<String> {
        self.lock()
            .requests
            .get(&id)
            .and_then(|r| r.error_message.clone())
    }

    /// Move a logged request to `status`, as the dispatcher would.
    pub fn set_status(&self, id: Uuid, status: RequestStatus) {
        if let Some(req) = self.lock().requests.get_mut(&id) {
            req.status = status;
        }
    }

    #[must_use]
    pub fn request_rows(&self, user_id: Uuid) -> usize {
        self.lock()
            .requests
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    #[must_use]
    pub fn bucket_rows(&self) -> usize {
        self.lock().buckets.len()
    }

    fn in_flight(inner: &Inner, user_id: Uuid) -> i64 {
        let n = inner
            .requests
            .values()
            .filter(|r| r.user_id == user_id && r.status.is_in_flight())
            .count();
        i64::try_from(n).unwrap_or(i64::MAX)
    }
}

#[async_trait::async_trait]
impl AdmissionStore for MemoryStore {
    async fn increment_bucket(&self, user_id: Uuid, window: &Window) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .buckets
            .entry((user_id, window.bucket_type, window.key.clone()))
            .or_insert((0, window.end));
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn read_bucket(&self, user_id: Uuid, window: &Window) -> Result<Option<i64>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .buckets
            .get(&(user_id, window.bucket_type, window.key.clone()))
            .map(|(count, _)| *count))
    }

    async fn count_in_flight(&self, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(Self::in_flight(&self.lock(), user_id))
    }

    async fn enqueue_if_below(
        &self,
        user_id: Uuid,
        max_concurrent: i64,
        _request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        let mut inner = self.lock();
        let in_flight = Self::in_flight(&inner, user_id);
        if in_flight >= max_concurrent {
            return Ok(EnqueueOutcome::AtCapacity { in_flight });
        }
        let id = Uuid::new_v4();
        let created_at = OffsetDateTime::now_utc();
        inner.requests.insert(
            id,
            LoggedRequest { user_id, status: RequestStatus::Pending, created_at, error_message: None },
        );
        Ok(EnqueueOutcome::Enqueued(PendingRequest { id, created_at }))
    }

    async fn discard_pending(&self, request_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let pending = inner
            .requests
            .get(&request_id)
            .is_some_and(|r| r.status == RequestStatus::Pending);
        if pending {
            inner.requests.remove(&request_id);
        }
        Ok(pending)
    }

    async fn fail_in_flight_before(&self, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError> {
        let mut released = 0;
        for req in self.lock().requests.values_mut() {
            if req.status.is_in_flight() && req.created_at < cutoff {
                req.status = RequestStatus::Failed;
                req.error_message = Some(reason.to_string());
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Delegates to a `MemoryStore`, but `enqueue_if_below` sleeps for the
/// configured delay after its insert has been applied.
#[derive(Default)]
pub struct SlowCommitStore {
    pub inner: MemoryStore,
    delay_ms: AtomicU64,
}

impl SlowCommitStore {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        let store = Self::default();
        store.set_delay(delay);
        store
    }

    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl AdmissionStore for SlowCommitStore {
    async fn increment_bucket(&self, user_id: Uuid, window: &Window) -> Result<i64, StoreError> {
        self.inner.increment_bucket(user_id, window).await
    }

    async fn read_bucket(&self, user_id: Uuid, window: &Window) -> Result<Option<i64>, StoreError> {
        self.inner.read_bucket(user_id, window).await
    }

    async fn count_in_flight(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.inner.count_in_flight(user_id).await
    }

    async fn enqueue_if_below(
        &self,
        user_id: Uuid,
        max_concurrent: i64,
        request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        let outcome = self
            .inner
            .enqueue_if_below(user_id, max_concurrent, request)
            .await?;
        tokio::time::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))).await;
        Ok(outcome)
    }

    async fn discard_pending(&self, request_id: Uuid) -> Result<bool, StoreError> {
        self.inner.discard_pending(request_id).await
    }

    async fn fail_in_flight_before(&self, cutoff: OffsetDateTime, reason: &str) -> Result<u64, StoreError> {
        self.inner.fail_in_flight_before(cutoff, reason).await
    }
}

/// Every call fails as if the database were down.
pub struct FailingStore;

#[async_trait::async_trait]
impl AdmissionStore for FailingStore {
    async fn increment_bucket(&self, _user_id: Uuid, _window: &Window) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn read_bucket(&self, _user_id: Uuid, _window: &Window) -> Result<Option<i64>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn count_in_flight(&self, _user_id: Uuid) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn enqueue_if_below(
        &self,
        _user_id: Uuid,
        _max_concurrent: i64,
        _request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn discard_pending(&self, _request_id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn fail_in_flight_before(&self, _cutoff: OffsetDateTime, _reason: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Every call hangs forever.
pub struct StallingStore;

#[async_trait::async_trait]
impl AdmissionStore for StallingStore {
    async fn increment_bucket(&self, _user_id: Uuid, _window: &Window) -> Result<i64, StoreError> {
        std::future::pending().await
    }

    async fn read_bucket(&self, _user_id: Uuid, _window: &Window) -> Result<Option<i64>, StoreError> {
        std::future::pending().await
    }

    async fn count_in_flight(&self, _user_id: Uuid) -> Result<i64, StoreError> {
        std::future::pending().await
    }

    async fn enqueue_if_below(
        &self,
        _user_id: Uuid,
        _max_concurrent: i64,
        _request: &NewInferenceRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        std::future::pending().await
    }

    async fn discard_pending(&self, _request_id: Uuid) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn fail_in_flight_before(&self, _cutoff: OffsetDateTime, _reason: &str) -> Result<u64, StoreError> {
        std::future::pending().await
    }
}
