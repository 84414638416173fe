//! Control primitives.
//!
//! Stateless or minimally stateful building blocks the engine composes
//! every tick: PID, ramp-time estimation and relay allocation with PWM.

pub mod allocator;
pub mod pid;
pub mod ramp;
