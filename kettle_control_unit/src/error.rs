//! Engine error type.
//!
//! Commands never surface these directly; they are folded into a
//! [`CommandOutcome::Rejected`](crate::command::CommandOutcome) reason.
//! The control loop sees them from [`Engine::tick`](crate::engine::Engine::tick)
//! and fails safe.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("No recipe loaded")]
    NoRecipeLoaded,

    #[error("Step index {index} out of range ({len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Non-finite temperature reading: {0}")]
    NonFiniteReading(f64),
}

impl EngineError {
    /// Short operator-facing reason.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NoRecipeLoaded => "no recipe loaded",
            Self::StepOutOfRange { .. } => "step index out of range",
            Self::NonFiniteReading(_) => "invalid temperature reading",
        }
    }
}
