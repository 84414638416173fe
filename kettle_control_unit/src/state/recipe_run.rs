//! Per-step run state.
//!
//! A step goes through two phases. While heating, the latch is open and
//! the step timer reads zero. Once the latch closes, the timer runs from
//! the latch instant, minus any time spent paused or waiting:
//!
//! ```text
//!   enter ──► heating (ramp cap) ──latch──► timing (hold cap)
//!                                             │
//!                     addition due ◄──────────┤ remaining <= time point
//!                     step done    ◄──────────┘ elapsed >= duration
//! ```

use kettle_common::config::ProcessConfig;
use kettle_common::consts::ADDITION_EPSILON_MIN;
use kettle_common::recipe::{PowerMode, Step};

use crate::control::pid::Pid;
use crate::state::latch::TempLatch;

/// What the step timer asks the engine to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEvent {
    /// Nothing to act on.
    Timing,
    /// Addition at this index is due.
    AdditionDue(usize),
    /// Duration elapsed with every addition fired.
    StepDone,
}

/// Timing and latch state of the active step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRun {
    /// Commanded target, already clamped to the ceiling [°F].
    pub target: f64,
    pub latch: TempLatch,
    /// Monotonic time the latch closed.
    pub step_start: f64,
    /// Paused/waiting time accumulated since the latch closed [s].
    pub paused_total: f64,
    /// Start of the pause in progress, if any.
    pub pause_started: Option<f64>,
    /// Timed seconds, frozen while not running.
    pub elapsed: f64,
    /// Reading when the step was entered; decides the reached chime.
    pub initial_temp: f64,
}

impl StepRun {
    pub fn new(step: &Step, initial_temp: f64, process: &ProcessConfig) -> Self {
        Self {
            target: step.effective_target().min(process.max_target_temp),
            latch: TempLatch::new(process.latch_debounce_s),
            step_start: 0.0,
            paused_total: 0.0,
            pause_started: None,
            elapsed: 0.0,
            initial_temp,
        }
    }

    #[inline]
    pub const fn is_reached(&self) -> bool {
        self.latch.is_reached()
    }

    /// Latch threshold: a step targeting above boil latches at boil.
    pub fn threshold(&self, process: &ProcessConfig) -> f64 {
        self.target.min(process.boil_temp) - process.latch_tolerance
    }

    /// Start timing from `now`. A step that latches while paused or
    /// waiting treats the latch instant as the start of that pause.
    pub fn mark_reached(&mut self, now: f64, paused: bool) {
        self.step_start = now;
        self.paused_total = 0.0;
        if paused {
            self.pause_started = Some(now);
        }
    }

    pub fn begin_pause(&mut self, now: f64) {
        self.pause_started = Some(now);
    }

    /// Close the pause in progress and return its length.
    pub fn end_pause(&mut self, now: f64) -> f64 {
        let Some(since) = self.pause_started.take() else {
            return 0.0;
        };
        let paused = now - since;
        if paused > 0.0 {
            self.paused_total += paused;
            paused
        } else {
            0.0
        }
    }

    /// Re-anchor a restored step so that `elapsed` seconds have run.
    pub fn restore_elapsed(&mut self, now: f64, elapsed: f64) {
        self.latch.force();
        self.step_start = now - elapsed;
        self.paused_total = 0.0;
        self.elapsed = elapsed;
    }

    /// Seconds left on the step timer, never negative.
    pub fn remaining(&self, step: &Step) -> f64 {
        (step.duration_secs() - self.elapsed).max(0.0)
    }

    /// Advance the step timer to `now` and report what is due.
    pub fn evaluate_time(&mut self, step: &Step, now: f64) -> TimeEvent {
        if !self.is_reached() {
            self.elapsed = 0.0;
            return TimeEvent::Timing;
        }
        self.elapsed = now - self.step_start - self.paused_total;

        let duration = step.duration_secs();
        let remaining_min = (duration - self.elapsed) / 60.0;
        let due = step.additions.iter().position(|a| {
            !a.triggered
                && (remaining_min <= a.time_point_min + ADDITION_EPSILON_MIN
                    || step.duration_min <= 0.0)
        });
        if let Some(index) = due {
            return TimeEvent::AdditionDue(index);
        }
        if self.elapsed >= duration {
            TimeEvent::StepDone
        } else {
            TimeEvent::Timing
        }
    }

    /// Heater demand for this tick [W].
    ///
    /// Ramp cap before the latch, hold cap after. Open-loop kinds and
    /// targets at or above boil get the cap directly; anything else scales
    /// the PID output onto it. A zero target means heater off.
    pub fn power_request(
        &self,
        step: &Step,
        pid: &mut Pid,
        now: f64,
        current: f64,
        process: &ProcessConfig,
        default_watts: f64,
    ) -> f64 {
        let cap = if self.is_reached() {
            step.hold_cap(default_watts)
        } else {
            step.ramp_cap(default_watts)
        };

        if self.target <= 0.0 {
            0.0
        } else if step.kind.power_mode() == PowerMode::OpenLoop
            || self.target >= process.boil_temp
        {
            cap
        } else {
            let out = pid.compute(now, current, self.target);
            (out / 100.0 * cap).clamp(0.0, cap.max(0.0))
        }
    }
}

// ─── Global Timer ───────────────────────────────────────────────────

/// Whole-program clock: starts at the first step and excludes pauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalTimer {
    start: Option<f64>,
    paused: f64,
}

impl GlobalTimer {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub const fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn start_if_unset(&mut self, now: f64) {
        self.start.get_or_insert(now);
    }

    /// Credit a completed pause. Ignored before the timer starts.
    pub fn add_pause(&mut self, secs: f64) {
        if self.start.is_some() {
            self.paused += secs;
        }
    }

    /// Restart so that `elapsed` seconds have already run.
    pub fn restore(&mut self, now: f64, elapsed: f64) {
        self.start = Some(now - elapsed);
        self.paused = 0.0;
    }

    /// Seconds run at `now`, excluding a pause that began at `pause_started`.
    pub fn elapsed(&self, now: f64, pause_started: Option<f64>) -> f64 {
        let Some(start) = self.start else {
            return 0.0;
        };
        let current_pause = pause_started.map_or(0.0, |p| (now - p).max(0.0));
        (now - start - self.paused - current_pause).max(0.0)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
