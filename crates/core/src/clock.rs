// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Backoff windows, dedup suppression, and the mass-death deck all reason
//! about elapsed time; tests drive them through [`FakeClock`] instead of
//! sleeping.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A clock that provides both monotonic and wall time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant for interval arithmetic.
    fn now(&self) -> Instant;
    /// Wall-clock time for persisted records.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    instant: Instant,
    utc: DateTime<Utc>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                instant: Instant::now(),
                // Arbitrary fixed origin so persisted timestamps are stable
                utc: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now),
            })),
        }
    }

    /// Advance both monotonic and wall time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.instant += duration;
        if let Ok(delta) = chrono::Duration::from_std(duration) {
            state.utc += delta;
        }
    }

    /// Set the wall-clock component directly.
    pub fn set_utc(&self, utc: DateTime<Utc>) {
        self.inner.lock().utc = utc;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().instant
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.inner.lock().utc
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
