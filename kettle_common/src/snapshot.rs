//! Recovery snapshot: the slice of run state needed to resume after an
//! abrupt restart.
//!
//! Serialized as JSON with a `mode_type` tag. Every field has a default so
//! that a truncated or hand-edited record still loads; the engine decides
//! whether the result is usable.
//!
//! ```json
//! {"mode_type": "manual", "elapsed_time": 300, "temp_reached": true}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_POWER_WATTS, MANUAL_TARGET_TEMP, MANUAL_TIMER_MIN, MANUAL_VOLUME};
use crate::state::{RunOrigin, SequenceStatus};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

fn current_version() -> u32 {
    SNAPSHOT_VERSION
}

/// One recovery record. The variant is the mode that was active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode_type", rename_all = "lowercase")]
pub enum RecoverySnapshot {
    #[serde(alias = "PROFILE", alias = "profile")]
    Recipe(RecipeProgress),
    #[serde(alias = "MANUAL")]
    Manual(ManualProgress),
    #[serde(alias = "DELAY", alias = "delay")]
    Delayed(DelayedProgress),
}

/// Mode discriminant without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Recipe,
    Manual,
    Delayed,
}

impl RecoverySnapshot {
    pub const fn mode(&self) -> RecoveryMode {
        match self {
            Self::Recipe(_) => RecoveryMode::Recipe,
            Self::Manual(_) => RecoveryMode::Manual,
            Self::Delayed(_) => RecoveryMode::Delayed,
        }
    }

    /// Wall time the snapshot was written.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Recipe(p) => p.saved_at,
            Self::Manual(p) => p.saved_at,
            Self::Delayed(p) => p.saved_at,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::Recipe(p) => p.version,
            Self::Manual(p) => p.version,
            Self::Delayed(p) => p.version,
        }
    }
}

/// Recipe run position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeProgress {
    #[serde(default = "current_version")]
    pub version: u32,
    pub saved_at: Option<DateTime<Utc>>,
    /// Status at save time; informational.
    pub status: SequenceStatus,
    #[serde(alias = "profile_id")]
    pub recipe_id: String,
    pub step_index: usize,
    /// Step seconds counted since the latch.
    pub elapsed_time: f64,
    pub temp_reached: bool,
    /// Whole-program seconds.
    pub global_elapsed: f64,
    /// Addition ids of the current step that already fired.
    pub fired_additions: Vec<String>,
}

impl Default for RecipeProgress {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            status: SequenceStatus::Running,
            recipe_id: String::new(),
            step_index: 0,
            elapsed_time: 0.0,
            temp_reached: false,
            global_elapsed: 0.0,
            fired_additions: Vec::new(),
        }
    }
}

/// Manual session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualProgress {
    #[serde(default = "current_version")]
    pub version: u32,
    pub saved_at: Option<DateTime<Utc>>,
    pub target_temp: f64,
    pub ramp_watts: f64,
    pub hold_watts: f64,
    pub volume: f64,
    pub heater_enabled: bool,
    /// Countdown length [s].
    #[serde(alias = "manual_timer_duration")]
    pub timer_duration: f64,
    pub temp_reached: bool,
    /// Countdown seconds consumed.
    pub elapsed_time: f64,
}

impl Default for ManualProgress {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            target_temp: MANUAL_TARGET_TEMP,
            ramp_watts: DEFAULT_POWER_WATTS,
            hold_watts: DEFAULT_POWER_WATTS,
            volume: MANUAL_VOLUME,
            heater_enabled: false,
            timer_duration: MANUAL_TIMER_MIN * 60.0,
            temp_reached: false,
            elapsed_time: 0.0,
        }
    }
}

/// Pending delayed start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayedProgress {
    #[serde(default = "current_version")]
    pub version: u32,
    pub saved_at: Option<DateTime<Utc>>,
    pub ready_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub target_temp: f64,
    pub volume: f64,
    pub origin: RunOrigin,
}

impl Default for DelayedProgress {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            ready_at: DateTime::<Utc>::default(),
            fire_at: DateTime::<Utc>::default(),
            target_temp: 0.0,
            volume: 0.0,
            origin: RunOrigin::default(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
