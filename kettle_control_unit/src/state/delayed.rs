//! Delayed start.
//!
//! The operator names a ready time; heating is scheduled to begin early
//! enough to reach the target by then. The estimate is refreshed every
//! [`DELAYED_RECOMPUTE_S`] from the live reading so a kettle that cools
//! overnight still starts in time.

use chrono::{DateTime, Local, TimeDelta, Utc};
use kettle_common::consts::{DEFAULT_POWER_WATTS, DELAYED_RECOMPUTE_S};
use kettle_common::snapshot::{DelayedProgress, SNAPSHOT_VERSION};
use kettle_common::state::RunOrigin;

use crate::control::ramp::{estimate_minutes, RampCalibration};

#[derive(Debug, Clone, PartialEq)]
pub struct DelayedStart {
    pub ready_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    /// [°F]
    pub target_temp: f64,
    /// [gal]
    pub volume: f64,
    pub origin: RunOrigin,
    last_estimate: f64,
}

/// `ready_at` minus a heating estimate.
pub fn fire_time(
    ready_at: DateTime<Utc>,
    start_temp: f64,
    target_temp: f64,
    volume: f64,
    cal: &RampCalibration,
) -> DateTime<Utc> {
    let minutes = estimate_minutes(start_temp, target_temp, volume, Some(DEFAULT_POWER_WATTS), cal);
    ready_at - TimeDelta::milliseconds((minutes * 60_000.0).round() as i64)
}

impl DelayedStart {
    /// Plan a start at monotonic time `now` from `start_temp`.
    pub fn plan(
        now: f64,
        ready_at: DateTime<Utc>,
        target_temp: f64,
        volume: f64,
        origin: RunOrigin,
        start_temp: f64,
        cal: &RampCalibration,
    ) -> Self {
        Self {
            ready_at,
            fire_at: fire_time(ready_at, start_temp, target_temp, volume, cal),
            target_temp,
            volume,
            origin,
            last_estimate: now,
        }
    }

    /// Rebuild from a snapshot, trusting its fire time until the next
    /// refresh.
    pub fn from_progress(now: f64, p: &DelayedProgress) -> Self {
        Self {
            ready_at: p.ready_at,
            fire_at: p.fire_at,
            target_temp: p.target_temp,
            volume: p.volume,
            origin: p.origin,
            last_estimate: now,
        }
    }

    pub fn progress(&self, saved_at: DateTime<Utc>) -> DelayedProgress {
        DelayedProgress {
            version: SNAPSHOT_VERSION,
            saved_at: Some(saved_at),
            ready_at: self.ready_at,
            fire_at: self.fire_at,
            target_temp: self.target_temp,
            volume: self.volume,
            origin: self.origin,
        }
    }

    /// Re-estimate from `current` once the refresh period has passed.
    /// Returns `true` if the estimate was refreshed.
    pub fn refresh(&mut self, now: f64, current: f64, cal: &RampCalibration) -> bool {
        if now - self.last_estimate < DELAYED_RECOMPUTE_S {
            return false;
        }
        self.last_estimate = now;
        self.fire_at = fire_time(self.ready_at, current, self.target_temp, self.volume, cal);
        true
    }

    #[inline]
    pub fn is_due(&self, wall: DateTime<Utc>) -> bool {
        wall >= self.fire_at
    }

    /// Two-line operator message in local time.
    pub fn message(&self) -> String {
        format!(
            "Heat starts at: {}\nReady at: {}",
            self.fire_at.with_timezone(&Local).format("%H:%M"),
            self.ready_at.with_timezone(&Local).format("%H:%M"),
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
