//! Simulation driver module.
//!
//! A lumped thermal model of the kettle shared by a probe and a relay
//! bank, for development and testing without hardware.

mod driver;
mod model;

pub use driver::{SimProbe, SimRelays, SimulatedKettle};
pub use model::ThermalModel;
