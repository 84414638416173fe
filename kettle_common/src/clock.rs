//! Time source abstraction.
//!
//! The engine reads two clocks: a monotonic one for every interval it
//! measures (debounce, step timers, PID `dt`, PWM phase, energy) and a
//! wall clock for delayed-start scheduling and display. [`ManualClock`]
//! lets tests drive both without sleeping.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic and wall time.
pub trait Clock: Send + Sync {
    /// Seconds since an arbitrary fixed origin. Never decreases.
    fn monotonic(&self) -> f64;

    /// Current wall-clock time.
    fn wall(&self) -> DateTime<Utc>;
}

/// Process clock backed by [`Instant`] and the system time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
struct ManualTime {
    mono: f64,
    wall: DateTime<Utc>,
}

/// Test clock advanced explicitly; clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    /// Start at monotonic `mono` seconds and the given wall time.
    pub fn new(mono: f64, wall: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime { mono, wall })),
        }
    }

    /// Advance both clocks by `secs`.
    pub fn advance(&self, secs: f64) {
        let mut t = self.inner.lock();
        t.mono += secs;
        t.wall += TimeDelta::milliseconds((secs * 1000.0).round() as i64);
    }

    /// Jump the wall clock only (monotonic time is untouched).
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.inner.lock().wall = wall;
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> f64 {
        self.inner.lock().mono
    }

    fn wall(&self) -> DateTime<Utc> {
        self.inner.lock().wall
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_both_and_shares_state() {
        let wall = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(100.0, wall);
        let other = clock.clone();

        other.advance(90.5);
        assert_eq!(clock.monotonic(), 190.5);
        assert_eq!(clock.wall(), wall + TimeDelta::milliseconds(90_500));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }
}
