//! Configuration loading traits and types.
//!
//! The controller reads one TOML document. Every section is optional and
//! falls back to the constants in [`crate::consts`]; the document carries
//! an explicit `version` so older layouts can be upgraded before typed
//! deserialization.
//!
//! # Layout (version 2)
//!
//! ```toml
//! version = 2
//!
//! [shared]
//! log_level = "info"
//! service_name = "kettle"
//!
//! [loop]
//! tick_ms = 100
//!
//! [heater]
//! relay_watts = [1000, 800, 1000]
//! pwm_cycle_s = 30.0
//!
//! [pid]
//! kp = 50.0
//! ki = 0.02
//! kd = 10.0
//! ```
//!
//! ## Legacy layout (version 1)
//!
//! Files without a `version` key use the flat settings layout of earlier
//! releases (`[heater_config]`, `[system_settings]`, `[pid_settings]`,
//! `[manual_mode_settings]`). [`migrate`] rewrites them in place; see its
//! docs for the key map.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

use crate::consts::*;

/// Current configuration document version.
pub const CONFIG_VERSION: u32 = 2;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Document written by a newer release.
    #[error("Unsupported configuration version {0} (newest known is {CONFIG_VERSION})")]
    UnsupportedVersion(u32),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Fields shared by every kettle binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "kettle".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Default implementation for any `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Sections ───────────────────────────────────────────────────────

/// `[loop]`: control loop pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Tick period [ms].
    pub tick_ms: u64,
    /// Sensor samples older than this are treated as missing [ms].
    pub sensor_stale_ms: u64,
    /// Period of the structured status log line [s]. 0 disables it.
    pub status_log_interval_s: u64,
    /// CPU core to pin the loop thread to (`rt` feature only).
    pub cpu_core: usize,
    /// SCHED_FIFO priority (`rt` feature only).
    pub rt_priority: i32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_ms: TICK_MS,
            sensor_stale_ms: SENSOR_STALE_MS,
            status_log_interval_s: STATUS_LOG_INTERVAL_S,
            cpu_core: 0,
            rt_priority: 80,
        }
    }
}

/// `[process]`: thresholds that shape the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Boiling point; targets at or above it run open loop.
    pub boil_temp: f64,
    /// Ceiling applied to every commanded target.
    pub max_target_temp: f64,
    /// Band below target counted as reached.
    pub latch_tolerance: f64,
    /// How long the reached condition must hold [s].
    pub latch_debounce_s: f64,
    /// Alert repeat period while waiting on the operator [s]. 0 disables.
    pub alert_repeat_s: f64,
    /// Manual heat cut-off margin above target.
    pub manual_overtemp_margin: f64,
    /// Manual full-power band below target.
    pub manual_open_loop_band: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            boil_temp: BOIL_TEMP,
            max_target_temp: MAX_TARGET_TEMP,
            latch_tolerance: LATCH_TOLERANCE,
            latch_debounce_s: LATCH_DEBOUNCE_S,
            alert_repeat_s: ALERT_REPEAT_S,
            manual_overtemp_margin: MANUAL_OVERTEMP_MARGIN,
            manual_open_loop_band: MANUAL_OPEN_LOOP_BAND,
        }
    }
}

/// `[heater]`: relay wattages and PWM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaterConfig {
    /// Element wattage behind each relay. 0 marks an unused relay.
    pub relay_watts: [f64; RELAY_COUNT],
    /// PWM cycle length [s].
    pub pwm_cycle_s: f64,
    /// Cap used when a step leaves ramp/hold power unset.
    pub default_power_watts: f64,
    /// Tariff used for the cost readout.
    pub cost_per_kwh: f64,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            relay_watts: DEFAULT_RELAY_WATTS,
            pwm_cycle_s: PWM_CYCLE_S,
            default_power_watts: DEFAULT_POWER_WATTS,
            cost_per_kwh: COST_PER_KWH,
        }
    }
}

impl HeaterConfig {
    /// Sum of all relay wattages.
    pub fn total_watts(&self) -> f64 {
        self.relay_watts.iter().sum()
    }
}

/// `[calibration]`: ramp estimator constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Measured heating rate at `ref_volume` and 1800 W [°F/min].
    pub ref_rate: f64,
    /// Volume the rate was measured at [gal].
    pub ref_volume: f64,
    /// Start temperature assumed when the sensor has nothing yet.
    pub fallback_start_temp: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ref_rate: REF_RATE,
            ref_volume: REF_VOLUME,
            fallback_start_temp: FALLBACK_START_TEMP,
        }
    }
}

/// `[pid]`: controller gains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Error band inside which the integral accumulates.
    pub integral_window: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: PID_KP,
            ki: PID_KI,
            kd: PID_KD,
            integral_window: PID_INTEGRAL_WINDOW,
        }
    }
}

/// `[manual]`: values manual mode starts from.
///
/// Also the record persisted whenever the operator changes a manual
/// setting, so the next session opens where the last one left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualDefaults {
    pub target_temp: f64,
    pub timer_min: f64,
    pub ramp_watts: f64,
    pub hold_watts: f64,
    pub volume: f64,
}

impl Default for ManualDefaults {
    fn default() -> Self {
        Self {
            target_temp: MANUAL_TARGET_TEMP,
            timer_min: MANUAL_TIMER_MIN,
            ramp_watts: DEFAULT_POWER_WATTS,
            hold_watts: DEFAULT_POWER_WATTS,
            volume: MANUAL_VOLUME,
        }
    }
}

/// `[storage]`: data directory and boot behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding recovery, recipe and manual-default files.
    pub data_dir: PathBuf,
    /// Restore the last recovery snapshot on boot.
    pub auto_resume: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("kettle-data"),
            auto_resume: false,
        }
    }
}

/// `[hardware]`: physical wiring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// 1-Wire device id of the DS18B20 probe.
    pub sensor_id: String,
    /// BCM pin numbers driving the relays.
    pub relay_pins: [u32; RELAY_COUNT],
    /// Whether a high level closes a relay.
    pub relay_active_high: bool,
    /// sysfs GPIO root.
    pub gpio_root: PathBuf,
    /// sysfs 1-Wire device root.
    pub w1_root: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            sensor_id: "unassigned".to_string(),
            relay_pins: [26, 20, 21],
            relay_active_high: false,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            w1_root: PathBuf::from("/sys/bus/w1/devices"),
        }
    }
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KettleConfig {
    /// Document version (see [`CONFIG_VERSION`]).
    pub version: u32,
    pub shared: SharedConfig,
    #[serde(rename = "loop")]
    pub cycle: LoopConfig,
    pub process: ProcessConfig,
    pub heater: HeaterConfig,
    pub calibration: CalibrationConfig,
    pub pid: PidConfig,
    pub manual: ManualDefaults,
    pub storage: StorageConfig,
    pub hardware: HardwareConfig,
}

impl Default for KettleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            shared: SharedConfig::default(),
            cycle: LoopConfig::default(),
            process: ProcessConfig::default(),
            heater: HeaterConfig::default(),
            calibration: CalibrationConfig::default(),
            pid: PidConfig::default(),
            manual: ManualDefaults::default(),
            storage: StorageConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl KettleConfig {
    /// Parse, migrate and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let doc: Table =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::from_table(doc)
    }

    /// Load, migrate and validate a TOML file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let doc = Table::load(path)?;
        Self::from_table(doc)
    }

    fn from_table(doc: Table) -> Result<Self, ConfigError> {
        let doc = migrate(doc)?;
        let config: Self = Value::Table(doc)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(TICK_MS_MIN..=TICK_MS_MAX).contains(&self.cycle.tick_ms) {
            return fail(format!(
                "tick_ms {} out of range [{TICK_MS_MIN}, {TICK_MS_MAX}]",
                self.cycle.tick_ms
            ));
        }
        if self.heater.pwm_cycle_s <= 0.0 {
            return fail(format!("pwm_cycle_s must be > 0, got {}", self.heater.pwm_cycle_s));
        }
        if let Some(w) = self.heater.relay_watts.iter().find(|w| !(**w >= 0.0)) {
            return fail(format!("relay wattage must be >= 0, got {w}"));
        }
        if self.process.boil_temp > self.process.max_target_temp {
            return fail(format!(
                "boil_temp {} exceeds max_target_temp {}",
                self.process.boil_temp, self.process.max_target_temp
            ));
        }
        if self.process.latch_debounce_s <= 0.0 {
            return fail("latch_debounce_s must be > 0".to_string());
        }
        if self.calibration.ref_rate <= 0.0 || self.calibration.ref_volume <= 0.0 {
            return fail("ref_rate and ref_volume must be > 0".to_string());
        }
        if self.pid.kp < 0.0 || self.pid.ki < 0.0 || self.pid.kd < 0.0 {
            return fail("PID gains must be >= 0".to_string());
        }
        if self.pid.integral_window <= 0.0 {
            return fail("integral_window must be > 0".to_string());
        }
        Ok(())
    }
}

// ─── Migration ──────────────────────────────────────────────────────

/// Upgrade a raw document to [`CONFIG_VERSION`].
///
/// Version 1 (no `version` key) key map:
///
/// | Legacy                                   | Current                        |
/// |------------------------------------------|--------------------------------|
/// | `heater_config.relay{1,2,3}_watts`       | `heater.relay_watts`           |
/// | `system_settings.boil_temp_f`            | `process.boil_temp`            |
/// | `system_settings.alert_repeat_freq`      | `process.alert_repeat_s`       |
/// | `system_settings.cost_per_kwh`           | `heater.cost_per_kwh`          |
/// | `system_settings.heater_ref_rate_fpm`    | `calibration.ref_rate`         |
/// | `system_settings.heater_ref_volume_gal`  | `calibration.ref_volume`       |
/// | `system_settings.auto_resume_enabled`    | `storage.auto_resume`          |
/// | `system_settings.temp_sensor_id`         | `hardware.sensor_id`           |
/// | `system_settings.relay_active_high`      | `hardware.relay_active_high`   |
/// | `pid_settings.*`                         | `pid.*`                        |
/// | `manual_mode_settings.last_*`            | `manual.*`                     |
/// | `manual_mode_settings.power_watts`       | `manual.ramp_watts` + `hold_watts` when both absent |
pub fn migrate(mut doc: Table) -> Result<Table, ConfigError> {
    let version = match doc.get("version") {
        None => 1,
        Some(Value::Integer(v)) => u32::try_from(*v)
            .map_err(|_| ConfigError::ParseError(format!("invalid version {v}")))?,
        Some(other) => {
            return Err(ConfigError::ParseError(format!(
                "version must be an integer, got {other}"
            )));
        }
    };
    if version > CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(version));
    }
    if version < 2 {
        migrate_v1(&mut doc);
        tracing::info!("Configuration upgraded from version {version} to {CONFIG_VERSION}");
    }
    doc.insert("version".into(), Value::Integer(i64::from(CONFIG_VERSION)));
    Ok(doc)
}

fn migrate_v1(doc: &mut Table) {
    if let Some(Value::Table(heater)) = doc.remove("heater_config") {
        let watts: Vec<Value> = ["relay1_watts", "relay2_watts", "relay3_watts"]
            .iter()
            .zip(DEFAULT_RELAY_WATTS)
            .map(|(key, default)| {
                heater
                    .get(*key)
                    .filter(|v| is_number(v))
                    .cloned()
                    .unwrap_or(Value::Float(default))
            })
            .collect();
        with_section(doc, "heater", |t| {
            t.insert("relay_watts".into(), Value::Array(watts));
        });
    }

    if let Some(Value::Table(sys)) = doc.remove("system_settings") {
        let moves: [(&str, &str, &str); 8] = [
            ("boil_temp_f", "process", "boil_temp"),
            ("alert_repeat_freq", "process", "alert_repeat_s"),
            ("cost_per_kwh", "heater", "cost_per_kwh"),
            ("heater_ref_rate_fpm", "calibration", "ref_rate"),
            ("heater_ref_volume_gal", "calibration", "ref_volume"),
            ("auto_resume_enabled", "storage", "auto_resume"),
            ("temp_sensor_id", "hardware", "sensor_id"),
            ("relay_active_high", "hardware", "relay_active_high"),
        ];
        for (from, table, to) in moves {
            if let Some(v) = sys.get(from) {
                with_section(doc, table, |t| {
                    t.insert(to.into(), v.clone());
                });
            }
        }
    }

    if let Some(Value::Table(pid)) = doc.remove("pid_settings") {
        with_section(doc, "pid", |dst| dst.extend(pid));
    }

    if let Some(Value::Table(manual)) = doc.remove("manual_mode_settings") {
        with_section(doc, "manual", |dst| {
            let moves = [
                ("last_setpoint_f", "target_temp"),
                ("last_timer_min", "timer_min"),
                ("last_volume_gal", "volume"),
                ("last_ramp_watts", "ramp_watts"),
                ("last_hold_watts", "hold_watts"),
            ];
            for (from, to) in moves {
                if let Some(v) = manual.get(from) {
                    dst.insert(to.into(), v.clone());
                }
            }
            if let Some(legacy) = manual.get("power_watts").filter(|v| is_number(v)) {
                for key in ["ramp_watts", "hold_watts"] {
                    if !dst.contains_key(key) {
                        dst.insert(key.into(), legacy.clone());
                    }
                }
            }
        });
    }
}

/// Run `f` against a sub-table, creating it when absent.
fn with_section(doc: &mut Table, name: &str, f: impl FnOnce(&mut Table)) {
    let mut table = match doc.remove(name) {
        Some(Value::Table(t)) => t,
        _ => Table::new(),
    };
    f(&mut table);
    doc.insert(name.to_string(), Value::Table(table));
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Integer(_) | Value::Float(_))
}

// ─── Tests ──────────────────────────────────────────────────────────
