//! Session energy and cost.
//!
//! Integrates the wattage of the relays that were actually commanded
//! closed, one tick at a time, so PWM and fail-safe intervals are
//! accounted for exactly.

use kettle_common::consts::{RELAY_COUNT, WS_PER_KWH};
use kettle_common::hal::RelayMask;

#[derive(Debug, Clone, Default)]
pub struct EnergyMeter {
    watt_seconds: f64,
    last_time: Option<f64>,
}

impl EnergyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit the interval since the previous call to `mask`, the mask that
    /// was in force during it. A non-positive interval contributes nothing.
    pub fn integrate(&mut self, now: f64, mask: RelayMask, caps: &[f64; RELAY_COUNT]) {
        if let Some(last) = self.last_time {
            let dt = now - last;
            if dt > 0.0 {
                self.watt_seconds += mask.watts(caps) * dt;
            }
        }
        self.last_time = Some(now);
    }

    /// Zero the session total and restart integration at `now`.
    pub fn reset(&mut self, now: f64) {
        self.watt_seconds = 0.0;
        self.last_time = Some(now);
    }

    #[inline]
    pub const fn watt_seconds(&self) -> f64 {
        self.watt_seconds
    }

    #[inline]
    pub fn kwh(&self) -> f64 {
        self.watt_seconds / WS_PER_KWH
    }

    #[inline]
    pub fn cost(&self, per_kwh: f64) -> f64 {
        self.kwh() * per_kwh
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
