//! # Kettle Control Unit Library
//!
//! Process-control brain for a three-element electric brewing kettle.
//! A fixed 100 ms cycle reads the temperature probe, runs the recipe,
//! manual or delayed-start state machine, turns the requested wattage
//! into relay states and writes them out.
//!
//! ## Layers
//!
//! 1. **Control** - PID, ramp estimate, relay allocation with slow PWM
//! 2. **State** - sequence status, debounced latch, step timing, manual
//!    session, delayed start
//! 3. **Safety** - sensor fail-safe, latched hard stop, crash recovery
//! 4. **Engine** - single owner of run state; commands and ticks
//! 5. **Cycle** - fixed-period loop around the engine and the drivers
//!
//! ## Module Structure
//!
//! - [`command`] - operator commands and their outcome
//! - [`config`] - startup configuration loading
//! - [`control`] - control primitives
//! - [`cycle`] - RT setup and the cycle runner
//! - [`energy`] - kWh metering
//! - [`engine`] - the process-control engine
//! - [`error`] - engine error type
//! - [`handle`] - lock-protected shared engine
//! - [`predict`] - whole-recipe schedule prediction
//! - [`safety`] - fail-safe, hard stop, recovery
//! - [`state`] - run-state machines
//! - [`status`] - operator-facing status queries

pub mod command;
pub mod config;
pub mod control;
pub mod cycle;
pub mod energy;
pub mod engine;
pub mod error;
pub mod handle;
pub mod predict;
pub mod safety;
pub mod state;
pub mod status;

pub use crate::command::{Command, CommandOutcome};
pub use crate::engine::Engine;
pub use crate::handle::KettleHandle;
