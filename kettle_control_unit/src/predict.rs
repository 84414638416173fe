//! Whole-recipe schedule prediction.
//!
//! Forward-simulates the loaded recipe from the current position with the
//! ramp estimator: every remaining step heats at its ramp cap from the
//! previous step's target, then holds for its duration.

use chrono::{DateTime, Local, TimeDelta, Utc};
use serde::Serialize;

use kettle_common::state::SequenceStatus;

use crate::control::ramp::estimate_minutes;
use crate::engine::Engine;

/// When a step is expected to reach its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepEta {
    /// Step already behind us.
    Done,
    /// Current step, already at temperature.
    Now,
    At(DateTime<Utc>),
}

impl StepEta {
    /// `Done`, `Now` or local `HH:MM`.
    pub fn label(&self) -> String {
        match self {
            Self::Done => "Done".into(),
            Self::Now => "Now".into(),
            Self::At(t) => t.with_timezone(&Local).format("%H:%M").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulePrediction {
    /// One entry per recipe step.
    pub steps: Vec<StepEta>,
    /// Expected end of the last step.
    pub completion: DateTime<Utc>,
}

impl Engine {
    /// Predicted ready time of every step, or `None` without a recipe.
    pub fn predict_schedule(&self) -> Option<SchedulePrediction> {
        let recipe = self.recipe.as_ref()?;
        let cal = &self.ramp_cal;
        let default_watts = self.config.heater.default_power_watts;
        let current_index = self.step_index.unwrap_or(0);
        let volume = recipe.first_volume_hint().unwrap_or(self.manual.volume);

        let mut cursor = self.clock.wall();
        let mut sim_temp = self
            .current_temp
            .unwrap_or(self.config.calibration.fallback_start_temp);
        let mut steps = Vec::with_capacity(recipe.len());

        for (i, step) in recipe.steps.iter().enumerate() {
            let target = step.setpoint.unwrap_or(sim_temp);

            if i < current_index {
                steps.push(StepEta::Done);
                if let Some(sp) = step.setpoint {
                    sim_temp = sp;
                }
                continue;
            }

            if i == current_index {
                let latched = self.status() == SequenceStatus::Running
                    && self.run.as_ref().is_some_and(|r| r.is_reached());
                let hot = matches!((step.setpoint, self.current_temp), (Some(sp), Some(t)) if t >= sp);
                if latched || hot {
                    let remaining = self
                        .run
                        .as_ref()
                        .map_or(step.duration_secs(), |r| r.remaining(step));
                    steps.push(StepEta::Now);
                    cursor = later(cursor, remaining);
                    sim_temp = target.max(self.current_temp.unwrap_or(target));
                    continue;
                }
                sim_temp = self.current_temp.unwrap_or(sim_temp);
            }

            let ramp = estimate_minutes(
                sim_temp,
                target,
                volume,
                Some(step.ramp_cap(default_watts)),
                cal,
            ) * 60.0;
            steps.push(StepEta::At(later(cursor, ramp)));
            cursor = later(cursor, ramp + step.duration_secs());
            sim_temp = target;
        }

        Some(SchedulePrediction {
            steps,
            completion: cursor,
        })
    }
}

/// `t` plus `s` seconds, pinned to the latest representable instant.
fn later(t: DateTime<Utc>, s: f64) -> DateTime<Utc> {
    TimeDelta::try_milliseconds((s.max(0.0) * 1000.0).round() as i64)
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ─── Tests ──────────────────────────────────────────────────────────
