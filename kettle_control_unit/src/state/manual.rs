//! Manual-mode session.
//!
//! The operator sets a target, power caps, a volume and a timer. Heat is
//! applied while the heater is enabled; the timer only counts down once
//! the debounced latch closes, and only while the session is running.
//! Every settings change is also written back as the next session's
//! defaults by the engine.

use kettle_common::config::{ManualDefaults, ProcessConfig};

use crate::control::pid::Pid;
use crate::state::latch::TempLatch;

/// Outcome of one manual tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualEvent {
    None,
    /// The latch closed this tick.
    Reached,
    /// The countdown hit zero.
    TimerExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualSession {
    /// [°F]
    pub target_temp: f64,
    /// Cap while heating toward target [W].
    pub ramp_watts: f64,
    /// Cap once the latch closes [W].
    pub hold_watts: f64,
    /// [gal]
    pub volume: f64,
    /// Configured timer length [s].
    pub timer_duration: f64,
    /// Countdown [s].
    pub remaining: f64,
    /// Timer armed.
    pub running: bool,
    pub heater_enabled: bool,
    pub latch: TempLatch,
    /// Reading when the session started heating.
    pub initial_temp: f64,
    last_tick: Option<f64>,
}

impl ManualSession {
    pub fn from_defaults(defaults: &ManualDefaults, process: &ProcessConfig) -> Self {
        let timer_duration = (defaults.timer_min * 60.0).max(0.0);
        Self {
            target_temp: defaults.target_temp.min(process.max_target_temp),
            ramp_watts: defaults.ramp_watts,
            hold_watts: defaults.hold_watts,
            volume: defaults.volume,
            timer_duration,
            remaining: timer_duration,
            running: false,
            heater_enabled: false,
            latch: TempLatch::new(process.latch_debounce_s),
            initial_temp: 0.0,
            last_tick: None,
        }
    }

    /// Settings as they would be persisted.
    pub fn defaults(&self) -> ManualDefaults {
        ManualDefaults {
            target_temp: self.target_temp,
            timer_min: self.timer_duration / 60.0,
            ramp_watts: self.ramp_watts,
            hold_watts: self.hold_watts,
            volume: self.volume,
        }
    }

    /// Arm the timer and the heater at `now`.
    pub fn start(&mut self, now: f64, current: f64) {
        self.running = true;
        self.heater_enabled = true;
        self.last_tick = Some(now);
        if !self.latch.is_reached() {
            self.initial_temp = current;
        }
    }

    /// Change the timer length. The countdown follows unless it is
    /// already running against a closed latch.
    pub fn set_timer_duration(&mut self, secs: f64) {
        self.timer_duration = secs;
        if !self.running || !self.latch.is_reached() {
            self.remaining = secs;
        }
    }

    /// Timer seconds consumed so far.
    pub fn elapsed(&self) -> f64 {
        (self.timer_duration - self.remaining).max(0.0)
    }

    /// Advance latch and countdown to `now`.
    pub fn tick(&mut self, now: f64, current: f64, process: &ProcessConfig) -> ManualEvent {
        if !self.running {
            self.last_tick = Some(now);
            return ManualEvent::None;
        }
        let delta = (now - self.last_tick.unwrap_or(now)).max(0.0);
        self.last_tick = Some(now);

        if !self.latch.is_reached() {
            let threshold = self.target_temp.min(process.boil_temp) - process.latch_tolerance;
            return if self.latch.update(now, current, threshold) {
                ManualEvent::Reached
            } else {
                ManualEvent::None
            };
        }

        self.remaining -= delta;
        if self.remaining <= 0.0 {
            self.remaining = 0.0;
            ManualEvent::TimerExpired
        } else {
            ManualEvent::None
        }
    }

    /// Heater demand for this tick [W].
    ///
    /// Cuts out above `target + manual_overtemp_margin` or the hard
    /// ceiling. Far below target (or at boil) the active cap is applied
    /// directly, otherwise the PID output is scaled onto it.
    pub fn power_request(
        &self,
        pid: &mut Pid,
        now: f64,
        current: f64,
        process: &ProcessConfig,
    ) -> f64 {
        if !self.heater_enabled {
            return 0.0;
        }
        if current > self.target_temp + process.manual_overtemp_margin
            || current > process.max_target_temp
        {
            return 0.0;
        }
        let cap = if self.latch.is_reached() {
            self.hold_watts
        } else {
            self.ramp_watts
        };
        if self.target_temp >= process.boil_temp
            || self.target_temp - current > process.manual_open_loop_band
        {
            cap
        } else {
            let out = pid.compute(now, current, self.target_temp);
            (out / 100.0 * cap).clamp(0.0, cap.max(0.0))
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pid::PidGains;
    use kettle_common::config::PidConfig;

    fn session() -> ManualSession {
        let d = ManualDefaults {
            target_temp: 150.0,
            timer_min: 10.0,
            ramp_watts: 2800.0,
            hold_watts: 1000.0,
            volume: 6.0,
        };
        ManualSession::from_defaults(&d, &ProcessConfig::default())
    }

    fn pid() -> Pid {
        Pid::new(PidGains::from(&PidConfig::default()))
    }

    #[test]
    fn countdown_waits_for_latch() {
        let p = ProcessConfig::default();
        let mut s = session();
        s.start(0.0, 140.0);
        assert_eq!(s.tick(1.0, 140.0, &p), ManualEvent::None);
        assert_eq!(s.remaining, 600.0);

        assert_eq!(s.tick(2.0, 149.6, &p), ManualEvent::None);
        assert_eq!(s.tick(7.0, 149.6, &p), ManualEvent::Reached);
        assert_eq!(s.tick(67.0, 149.6, &p), ManualEvent::None);
        assert!((s.remaining - 540.0).abs() < 1e-9);
        assert!((s.elapsed() - 60.0).abs() < 1e-9);
        assert_eq!(s.tick(700.0, 149.6, &p), ManualEvent::TimerExpired);
        assert_eq!(s.remaining, 0.0);
    }

    #[test]
    fn stopped_session_does_not_count() {
        let p = ProcessConfig::default();
        let mut s = session();
        s.latch.force();
        s.tick(0.0, 150.0, &p);
        s.tick(100.0, 150.0, &p);
        assert_eq!(s.remaining, 600.0);
        s.running = true;
        s.tick(101.0, 150.0, &p);
        assert!((s.remaining - 599.0).abs() < 1e-9);
    }

    #[test]
    fn timer_change_respects_running_countdown() {
        let mut s = session();
        s.set_timer_duration(1200.0);
        assert_eq!(s.remaining, 1200.0);
        s.running = true;
        s.latch.force();
        s.remaining = 100.0;
        s.set_timer_duration(1800.0);
        assert_eq!(s.timer_duration, 1800.0);
        assert_eq!(s.remaining, 100.0);
    }

    #[test]
    fn overtemp_cutoff_and_open_loop_band() {
        let p = ProcessConfig::default();
        let mut pid = pid();
        let mut s = session();
        assert_eq!(s.power_request(&mut pid, 0.0, 100.0, &p), 0.0);

        s.heater_enabled = true;
        assert_eq!(s.power_request(&mut pid, 0.0, 100.0, &p), 2800.0);
        assert_eq!(s.power_request(&mut pid, 0.0, 152.5, &p), 0.0);
        s.latch.force();
        assert_eq!(s.power_request(&mut pid, 0.0, 140.0, &p), 1000.0);
    }

    #[test]
    fn defaults_round_trip() {
        let s = session();
        let d = s.defaults();
        assert_eq!(d.timer_min, 10.0);
        assert_eq!(d.ramp_watts, 2800.0);
    }
}
