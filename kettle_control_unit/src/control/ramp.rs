//! Heating-time estimate.
//!
//! A linear model calibrated at one reference point: `ref_rate` °F/min for
//! `ref_volume` gallons at the baseline wattage. Rate scales inversely with
//! volume and linearly with wattage.

use kettle_common::config::CalibrationConfig;
use kettle_common::consts::{DEFAULT_POWER_WATTS, ESTIMATE_SENTINEL_MIN};

/// Reference point of the heating model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampCalibration {
    /// °F/min at `ref_volume` and the baseline wattage.
    pub ref_rate: f64,
    /// gal.
    pub ref_volume: f64,
}

impl From<&CalibrationConfig> for RampCalibration {
    fn from(cfg: &CalibrationConfig) -> Self {
        Self {
            ref_rate: cfg.ref_rate,
            ref_volume: cfg.ref_volume,
        }
    }
}

/// Minutes to heat `volume` gallons from `start` to `target` at `watts`
/// (`None` = baseline wattage).
///
/// Returns 0 when no heating is needed or the volume is negligible, and
/// [`ESTIMATE_SENTINEL_MIN`] when the effective rate is effectively zero.
pub fn estimate_minutes(
    start: f64,
    target: f64,
    volume: f64,
    watts: Option<f64>,
    cal: &RampCalibration,
) -> f64 {
    if target <= start || volume <= 0.1 {
        return 0.0;
    }
    let watts = watts.unwrap_or(DEFAULT_POWER_WATTS);
    let rate = cal.ref_rate * (cal.ref_volume / volume) * (watts / DEFAULT_POWER_WATTS);
    if rate <= 0.01 {
        return ESTIMATE_SENTINEL_MIN;
    }
    (target - start) / rate
}

// ─── Tests ──────────────────────────────────────────────────────────
