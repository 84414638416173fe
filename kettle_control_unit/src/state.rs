//! Run-state machines.
//!
//! - [`sequence`] - top-level status transitions
//! - [`latch`] - debounced "temperature reached" latch
//! - [`recipe_run`] - per-step timing, additions and power demand
//! - [`manual`] - manual-mode session
//! - [`delayed`] - delayed-start planning

pub mod delayed;
pub mod latch;
pub mod manual;
pub mod recipe_run;
pub mod sequence;
