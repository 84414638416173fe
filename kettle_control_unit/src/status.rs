//! Operator-facing status queries.
//!
//! Plain text for a display and a serializable [`EngineSummary`] for the
//! periodic status log line.

use serde::Serialize;

use kettle_common::consts::RELAY_COUNT;
use kettle_common::state::{PendingAlert, SequenceStatus};

use crate::engine::Engine;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSummary {
    pub status: SequenceStatus,
    pub text: String,
    pub temp: Option<f64>,
    pub target: f64,
    pub reached: bool,
    pub step: Option<usize>,
    pub timer: String,
    pub elapsed: String,
    pub requested_watts: f64,
    pub applied_watts: f64,
    pub relays: [bool; RELAY_COUNT],
    pub kwh: f64,
    pub cost: f64,
    pub hard_stop: bool,
}

impl Engine {
    /// Whole-program seconds, excluding pauses and the pause in progress.
    pub fn global_elapsed(&self) -> f64 {
        let now = self.clock.monotonic();
        let pause_started = match self.status() {
            SequenceStatus::Paused | SequenceStatus::WaitingForUser => {
                self.run.as_ref().and_then(|r| r.pause_started)
            }
            _ => None,
        };
        self.global.elapsed(now, pause_started)
    }

    /// Whole-program time as `HH:MM`.
    pub fn global_elapsed_text(&self) -> String {
        let minutes = (self.global_elapsed() / 60.0).floor() as u64;
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }

    /// One-line (occasionally two-line) operator message.
    pub fn status_text(&self) -> String {
        match self.status() {
            SequenceStatus::Idle => return "Ready".into(),
            SequenceStatus::Completed => return "Brew Complete".into(),
            SequenceStatus::Manual => return "MANUAL MODE".into(),
            SequenceStatus::DelayedWait => {
                return self
                    .delayed
                    .as_ref()
                    .map_or_else(|| "Delayed start".into(), |d| d.message());
            }
            _ => {}
        }

        let (Some(index), Some(step)) = (self.step_index, self.current_step()) else {
            return "No Recipe Loaded".into();
        };
        let reached = self.run.as_ref().is_some_and(|r| r.is_reached());
        let base = format!("Step {}: {}", index + 1, step.name);

        match (self.status(), &self.pending) {
            (SequenceStatus::Running, _) if !reached => format!("HEATING - {}", step.name),
            (SequenceStatus::Paused, _) => format!("PAUSED - {base}"),
            (SequenceStatus::WaitingForUser, Some(PendingAlert::StepComplete { .. })) => {
                format!("DONE:\n{}", step.name)
            }
            (SequenceStatus::WaitingForUser, Some(alert)) => format!("ALERT: {}", alert.text()),
            (SequenceStatus::WaitingForUser, None) => format!("WAITING - {base}"),
            _ => base,
        }
    }

    /// Countdown as `MM:SS`, seconds rounded up.
    ///
    /// Manual shows its countdown, a delayed start shows the timer it will
    /// arm, and a recipe step shows what is left (the full duration while
    /// heating).
    pub fn display_timer(&self) -> String {
        let secs = match self.status() {
            SequenceStatus::Manual => self.manual.remaining,
            SequenceStatus::DelayedWait => self.manual.timer_duration,
            _ => match (self.current_step(), self.run.as_ref()) {
                (Some(step), Some(run)) => run.remaining(step),
                (Some(step), None) => step.duration_secs(),
                _ => 0.0,
            },
        };
        format_mmss(secs)
    }

    /// Next addition still to fire in the current step, latest time point
    /// first.
    pub fn upcoming_addition_text(&self) -> String {
        if self.status() == SequenceStatus::Idle {
            return String::new();
        }
        let Some(step) = self.current_step() else {
            return String::new();
        };
        if step.additions.is_empty() {
            return String::new();
        }
        step.additions
            .iter()
            .filter(|a| !a.triggered)
            .rev()
            .max_by(|a, b| a.time_point_min.total_cmp(&b.time_point_min))
            .map_or_else(
                || "No more alerts".into(),
                |a| format!("Next: {} @ {}m", a.name, a.time_point_min),
            )
    }

    pub fn summary(&self) -> EngineSummary {
        EngineSummary {
            status: self.status(),
            text: self.status_text(),
            temp: self.current_temp,
            target: self.target_temp(),
            reached: self.temp_reached(),
            step: self.step_index.filter(|_| self.status().is_recipe_active()),
            timer: self.display_timer(),
            elapsed: self.global_elapsed_text(),
            requested_watts: self.output.watts,
            applied_watts: self.applied_watts(),
            relays: self.output.mask.states(),
            kwh: self.energy.kwh(),
            cost: self.energy_cost(),
            hard_stop: self.is_hard_stopped(),
        }
    }
}

/// `seconds` as `MM:SS`; minutes may exceed two digits.
pub fn format_mmss(seconds: f64) -> String {
    let total = seconds.max(0.0).ceil() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kettle_common::clock::ManualClock;
    use kettle_common::config::KettleConfig;
    use kettle_common::recipe::Recipe;
    use kettle_hal::{LogAlertSink, MemoryStore};
    use std::sync::Arc;

    fn engine() -> (ManualClock, Engine) {
        let clock = ManualClock::new(0.0, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
        let engine = Engine::new(
            KettleConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(LogAlertSink::new()),
            Arc::new(MemoryStore::new()),
        );
        (clock, engine)
    }

    #[test]
    fn mmss_rounds_up() {
        assert_eq!(format_mmss(0.0), "00:00");
        assert_eq!(format_mmss(59.2), "01:00");
        assert_eq!(format_mmss(7200.0), "120:00");
        assert_eq!(format_mmss(-3.0), "00:00");
    }

    #[test]
    fn idle_and_manual_text() {
        let (_, mut e) = engine();
        assert_eq!(e.status_text(), "Ready");
        assert_eq!(e.upcoming_addition_text(), "");
        e.enter_manual();
        assert_eq!(e.status_text(), "MANUAL MODE");
        assert_eq!(e.display_timer(), "60:00");
    }

    #[test]
    fn heating_text_and_full_duration_timer() {
        let (_, mut e) = engine();
        e.load_recipe(Recipe::default_recipe());
        e.start();
        e.tick(Some(70.0)).unwrap();
        assert_eq!(e.status_text(), "HEATING - Step");
        assert_eq!(e.display_timer(), "00:00");
        assert_eq!(e.upcoming_addition_text(), "Next: Reserve 1.5 Gal for lautering @ 0m");
    }

    #[test]
    fn boil_additions_listed_latest_first() {
        let (_, mut e) = engine();
        e.load_recipe(Recipe::default_recipe());
        e.start();
        e.advance();
        e.advance();
        e.advance();
        assert_eq!(e.step_index(), Some(3));
        assert_eq!(e.upcoming_addition_text(), "Next: Bittering hops @ 60m");
        assert_eq!(e.display_timer(), "60:00");
    }

    #[test]
    fn paused_text_and_global_elapsed() {
        let (clock, mut e) = engine();
        e.load_recipe(Recipe::default_recipe());
        e.start();
        clock.advance(3720.0);
        assert_eq!(e.global_elapsed_text(), "01:02");
        e.pause();
        assert_eq!(e.status_text(), "PAUSED - Step 1: Step");
        let s = e.summary();
        assert_eq!(s.status, SequenceStatus::Paused);
        assert_eq!(s.step, Some(0));
        assert!(!s.hard_stop);
    }
}
