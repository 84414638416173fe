//! Run-state vocabulary shared by the engine, snapshots and front ends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level engine status.
///
/// ```text
///            start            pause
///   Idle ───────────► Running ◄─────► Paused
///    ▲                  │  ▲ resume
///    │ stop             │  │ advance / resume
///    │                  ▼  │
///    │             WaitingForUser
///    │                  │ last step
///    │                  ▼
///    └────────────── Completed
///
///   Manual ◄── enter_manual (from anywhere, via full stop)
///   DelayedWait ──fire──► Running | Manual
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SequenceStatus {
    #[default]
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "WAITING")]
    WaitingForUser,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "MANUAL")]
    Manual,
    #[serde(rename = "DELAY_WAIT")]
    DelayedWait,
}

impl SequenceStatus {
    /// Statuses in which a recipe step is being evaluated.
    #[inline]
    pub const fn is_recipe_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::WaitingForUser)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::WaitingForUser => "WAITING",
            Self::Completed => "COMPLETED",
            Self::Manual => "MANUAL",
            Self::DelayedWait => "DELAY_WAIT",
        }
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which context scheduled a delayed start; decides what firing and
/// cancelling return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOrigin {
    #[default]
    Recipe,
    Manual,
}

/// Why the engine is waiting on the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingAlert {
    /// A timed addition fired.
    Addition {
        step_index: usize,
        addition_id: String,
        name: String,
    },
    /// The step timer ran out under a manual-advance policy.
    StepComplete { step_index: usize, step_name: String },
}

impl PendingAlert {
    /// Operator-facing text.
    pub fn text(&self) -> &str {
        match self {
            Self::Addition { name, .. } => name,
            Self::StepComplete { .. } => "Step Complete",
        }
    }

    #[inline]
    pub const fn is_step_complete(&self) -> bool {
        matches!(self, Self::StepComplete { .. })
    }
}
