//! Fixed-window rate counter.
//!
//! DESIGN
//! ======
//! Each user gets one counter row per wall-clock minute, keyed by the UTC
//! minute (`YYYY-MM-DD-HH:MM`). The first request in a minute inserts the row
//! with count 1; later requests increment it. The insert-or-increment is a
//! single store operation so concurrent requests cannot both read the same
//! pre-increment count.
//!
//! TRADE-OFFS
//! ==========
//! A fixed window lets a user spend a full budget at 0:59 and another at 1:00,
//! so the peak rate across a boundary is up to twice the nominal limit. Old
//! rows are never reset in place; a new minute simply keys a new row and the
//! reaper removes the stale ones.

use time::{Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use super::store::{AdmissionStore, StoreError};
use super::tier::TierLimits;

/// Only bucket type in use today.
pub const BUCKET_PER_MINUTE: &str = "per_minute";

pub const WINDOW_LENGTH: Duration = Duration::MINUTE;

/// One fixed window: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub bucket_type: &'static str,
    pub key: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Window {
    /// The per-minute window containing `now`.
    #[must_use]
    pub fn containing(now: OffsetDateTime) -> Self {
        let now = now.to_offset(UtcOffset::UTC);
        let start = now - Duration::seconds(i64::from(now.second())) - Duration::nanoseconds(i64::from(now.nanosecond()));
        let key = format!(
            "{:04}-{:02}-{:02}-{:02}:{:02}",
            start.year(),
            u8::from(start.month()),
            start.day(),
            start.hour(),
            start.minute()
        );
        Self { bucket_type: BUCKET_PER_MINUTE, key, start, end: start + WINDOW_LENGTH }
    }
}

/// Post-increment state of a user's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCount {
    pub count: i64,
    pub window_end: OffsetDateTime,
}

impl RateCount {
    /// `count == limit` is still inside the budget; only the request after it
    /// is over.
    #[must_use]
    pub fn exceeds(&self, limits: TierLimits) -> bool {
        self.count > limits.requests_per_window
    }

    #[must_use]
    pub fn remaining(&self, limits: TierLimits) -> i64 {
        (limits.requests_per_window - self.count).max(0)
    }
}

/// Record one request against the user's current window and return the new
/// count.
///
/// # Errors
///
/// Returns the store's error unchanged; the caller decides how to fail.
pub async fn record_and_check(
    store: &dyn AdmissionStore,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<RateCount, StoreError> {
    let window = Window::containing(now);
    let count = store.increment_bucket(user_id, &window).await?;
    Ok(RateCount { count, window_end: window.end })
}

/// Current count without charging the window.
///
/// # Errors
///
/// Returns the store's error unchanged.
pub async fn peek(store: &dyn AdmissionStore, user_id: Uuid, now: OffsetDateTime) -> Result<RateCount, StoreError> {
    let window = Window::containing(now);
    let count = store.read_bucket(user_id, &window).await?.unwrap_or(0);
    Ok(RateCount { count, window_end: window.end })
}

#[cfg(test)]
#[path = "window_test.rs"]
mod tests;
