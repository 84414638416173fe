//! Process constants shared across the workspace.
//!
//! Temperatures are degrees Fahrenheit, volumes are gallons, power is
//! watts and durations are seconds unless a name says otherwise.

// ─── Actuators ──────────────────────────────────────────────────────

/// Number of heater relays on the kettle.
pub const RELAY_COUNT: usize = 3;

/// Per-relay element wattage when no configuration overrides it.
pub const DEFAULT_RELAY_WATTS: [f64; RELAY_COUNT] = [1000.0, 800.0, 1000.0];

/// Baseline wattage for steps without an explicit cap and for ramp estimates.
pub const DEFAULT_POWER_WATTS: f64 = 1800.0;

/// PWM cycle length [s].
pub const PWM_CYCLE_S: f64 = 30.0;

// ─── Loop ───────────────────────────────────────────────────────────

/// Control loop period [ms].
pub const TICK_MS: u64 = 100;
/// Lower bound for `tick_ms`.
pub const TICK_MS_MIN: u64 = 10;
/// Upper bound for `tick_ms`.
pub const TICK_MS_MAX: u64 = 1000;

/// Age after which a sensor sample is discarded [ms].
pub const SENSOR_STALE_MS: u64 = 3000;

/// Periodic status log interval [s].
pub const STATUS_LOG_INTERVAL_S: u64 = 30;

// ─── Process ────────────────────────────────────────────────────────

/// Boiling point threshold for the open-loop bypass [°F].
pub const BOIL_TEMP: f64 = 212.0;
/// Hard ceiling for any commanded target [°F].
pub const MAX_TARGET_TEMP: f64 = 215.0;
/// Band below target that counts as "reached" [°F].
pub const LATCH_TOLERANCE: f64 = 0.5;
/// Continuous time the reached condition must hold [s].
pub const LATCH_DEBOUNCE_S: f64 = 5.0;
/// Alert re-fire period while waiting on the operator [s].
pub const ALERT_REPEAT_S: f64 = 15.0;
/// Manual mode cuts heat this far above target [°F].
pub const MANUAL_OVERTEMP_MARGIN: f64 = 2.0;
/// Manual mode applies full power while this far below target [°F].
pub const MANUAL_OPEN_LOOP_BAND: f64 = 2.0;

/// Slack applied when matching an addition's time point [min].
pub const ADDITION_EPSILON_MIN: f64 = 0.005;

// ─── Ramp estimation ────────────────────────────────────────────────

/// Heating rate at the reference volume and baseline wattage [°F/min].
pub const REF_RATE: f64 = 1.3;
/// Volume the reference rate was measured at [gal].
pub const REF_VOLUME: f64 = 8.0;
/// Estimate returned when the effective rate is effectively zero [min].
pub const ESTIMATE_SENTINEL_MIN: f64 = 999.0;
/// Starting temperature assumed when no reading is available [°F].
pub const FALLBACK_START_TEMP: f64 = 60.0;

// ─── PID ────────────────────────────────────────────────────────────

pub const PID_KP: f64 = 50.0;
pub const PID_KI: f64 = 0.02;
pub const PID_KD: f64 = 10.0;
/// Integral accumulates only while |error| is below this [°F].
pub const PID_INTEGRAL_WINDOW: f64 = 5.0;
pub const PID_OUT_MIN: f64 = 0.0;
pub const PID_OUT_MAX: f64 = 100.0;

// ─── Manual / delayed ───────────────────────────────────────────────

pub const MANUAL_TARGET_TEMP: f64 = 150.0;
pub const MANUAL_TIMER_MIN: f64 = 60.0;
pub const MANUAL_VOLUME: f64 = 6.0;

/// Manual timer armed by a delayed start [min].
pub const DELAYED_TIMER_MIN: f64 = 30.0;
/// Fire-time recompute period while waiting [s].
pub const DELAYED_RECOMPUTE_S: f64 = 30.0;

/// Recovery heartbeat while a recipe step is timing [s].
pub const RECOVERY_HEARTBEAT_S: f64 = 30.0;

/// Longest step duration a stored recipe may carry [min].
pub const STEP_DURATION_MAX_MIN: f64 = 24.0 * 60.0;

// ─── Cost ───────────────────────────────────────────────────────────

pub const COST_PER_KWH: f64 = 0.12;
/// Watt-seconds per kilowatt-hour.
pub const WS_PER_KWH: f64 = 3_600_000.0;
