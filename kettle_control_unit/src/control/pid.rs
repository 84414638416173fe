//! Positional PID with a windowed, clamped integral.
//!
//! The integral accumulates only while the error magnitude is inside
//! `integral_window` and is zeroed outside it, so a long ramp never
//! winds up. The accumulator is further clamped so that `ki * integral`
//! stays inside the output range. Zero `ki` disables the integral term.
//!
//! Time is passed in explicitly (monotonic seconds) so the controller is
//! deterministic under test.

use kettle_common::config::PidConfig;
use kettle_common::consts::{PID_OUT_MAX, PID_OUT_MIN};

/// PID gains and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (0 = disabled).
    pub ki: f64,
    /// Derivative gain (0 = disabled).
    pub kd: f64,
    /// Integral accumulates only while |error| is below this [°F].
    pub integral_window: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl From<&PidConfig> for PidGains {
    fn from(cfg: &PidConfig) -> Self {
        Self {
            kp: cfg.kp,
            ki: cfg.ki,
            kd: cfg.kd,
            integral_window: cfg.integral_window,
            out_min: PID_OUT_MIN,
            out_max: PID_OUT_MAX,
        }
    }
}

/// Controller state.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    last_error: f64,
    /// `None` until the first sample anchors the time base.
    last_time: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            last_error: 0.0,
            last_time: None,
        }
    }

    #[inline]
    pub const fn gains(&self) -> &PidGains {
        &self.gains
    }

    #[inline]
    pub const fn integral(&self) -> f64 {
        self.integral
    }

    /// Zero the accumulator and forget the time base.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_time = None;
    }

    /// One controller step at monotonic time `now`.
    ///
    /// The first call after construction or [`reset`](Self::reset) only
    /// anchors time and returns 0. A non-positive `dt` returns 0 and leaves
    /// the state untouched.
    pub fn compute(&mut self, now: f64, current: f64, setpoint: f64) -> f64 {
        let Some(last) = self.last_time else {
            self.last_time = Some(now);
            return 0.0;
        };
        let dt = now - last;
        if dt <= 0.0 {
            return 0.0;
        }

        let g = self.gains;
        let error = setpoint - current;
        let p = g.kp * error;

        if error.abs() < g.integral_window {
            self.integral += error * dt;
        } else {
            self.integral = 0.0;
        }
        if g.ki > 0.0 {
            self.integral = self.integral.clamp(g.out_min / g.ki, g.out_max / g.ki);
        }
        let i = g.ki * self.integral;

        let d = g.kd * (error - self.last_error) / dt;

        self.last_error = error;
        self.last_time = Some(now);

        let output = p + i + d;
        if output.is_nan() {
            g.out_min
        } else {
            output.clamp(g.out_min, g.out_max)
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
