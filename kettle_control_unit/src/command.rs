//! Operator commands.
//!
//! Every front end (UI, CLI, remote API) drives the engine through
//! [`Command`] values applied under the engine lock, so a command is never
//! observed half-applied by the control loop. Each application yields a
//! [`CommandOutcome`]; a rejection leaves the engine unchanged.

use chrono::{DateTime, Utc};
use kettle_common::recipe::Recipe;
use kettle_common::snapshot::RecoverySnapshot;
use kettle_common::state::RunOrigin;

use crate::error::EngineError;
use crate::state::sequence::TransitionResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Recipe ──
    /// Full stop, then make `recipe` current at step 0.
    LoadRecipe(Recipe),
    Start,
    Pause,
    /// Resume a pause or acknowledge an alert. Also clears a hard stop.
    Resume,
    /// Skip to the next step (resuming first if needed).
    Advance,
    /// Full stop; the recipe stays loaded.
    Stop,
    /// Full stop and rewind to step 0 with all additions re-armed.
    Reset,
    /// Latched override: relays off until Start/Resume/Stop.
    HardStop,

    // ── Manual ──
    EnterManual,
    StartManual,
    PauseManual,
    /// Setpoint [°F].
    SetManualTarget(f64),
    /// Ramp cap [W].
    SetManualRampPower(f64),
    /// Hold cap [W].
    SetManualHoldPower(f64),
    /// Sets ramp and hold caps together [W].
    SetManualPower(f64),
    /// [gal]
    SetManualVolume(f64),
    /// [min]
    SetManualTimerDuration(f64),

    // ── Delayed start ──
    ScheduleDelayed {
        target_temp: f64,
        volume: f64,
        ready_at: DateTime<Utc>,
        /// `None` = recipe unless manual mode is active.
        origin: Option<RunOrigin>,
    },
    CancelDelayed,

    // ── Misc ──
    Restore(RecoverySnapshot),
    ResetEnergy,
}

impl Command {
    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadRecipe(_) => "load_recipe",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Advance => "advance",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::HardStop => "hard_stop",
            Self::EnterManual => "enter_manual",
            Self::StartManual => "start_manual",
            Self::PauseManual => "pause_manual",
            Self::SetManualTarget(_) => "set_manual_target",
            Self::SetManualRampPower(_) => "set_manual_ramp_power",
            Self::SetManualHoldPower(_) => "set_manual_hold_power",
            Self::SetManualPower(_) => "set_manual_power",
            Self::SetManualVolume(_) => "set_manual_volume",
            Self::SetManualTimerDuration(_) => "set_manual_timer_duration",
            Self::ScheduleDelayed { .. } => "schedule_delayed",
            Self::CancelDelayed => "cancel_delayed",
            Self::Restore(_) => "restore",
            Self::ResetEnergy => "reset_energy",
        }
    }
}

/// Result of applying a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Not applied, with the reason.
    Rejected(&'static str),
}

impl CommandOutcome {
    #[inline]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl From<EngineError> for CommandOutcome {
    fn from(e: EngineError) -> Self {
        Self::Rejected(e.reason())
    }
}

impl From<TransitionResult> for CommandOutcome {
    fn from(r: TransitionResult) -> Self {
        match r {
            TransitionResult::Ok(_) => Self::Applied,
            TransitionResult::Rejected(reason) => Self::Rejected(reason),
        }
    }
}
