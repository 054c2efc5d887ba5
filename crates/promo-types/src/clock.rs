//! Time source abstraction.
//!
//! Every component that compares against "now" takes an `Arc<dyn Clock>`
//! so expiry and revocation can be driven deterministically in tests.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Latest instant stored in a definition or record. Anything later is
/// clamped here so it still serializes as a four-digit-year RFC 3339 stamp.
pub fn latest_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `base + delta`, clamped to [`latest_instant`].
pub fn saturating_add(base: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    let latest = latest_instant();
    base.checked_add_signed(delta).map_or(latest, |instant| instant.min(latest))
}

/// `base - delta`, or the earliest representable instant on underflow.
pub fn saturating_sub(base: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    base.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
