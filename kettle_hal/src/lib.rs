//! # Kettle HAL
//!
//! Implementations of the collaborator traits declared in
//! `kettle_common::hal` and `kettle_common::store`.
//!
//! # Module Structure
//!
//! - [`drivers`] - sensor and relay drivers (simulation, 1-Wire, sysfs GPIO)
//! - [`smoothing`] - moving-average sensor wrapper
//! - [`sampler`] - background sensor thread with bounded staleness
//! - [`alert`] - log-backed alert sink
//! - [`store`] - JSON file store and in-memory store
//! - [`writer`] - write-behind store keeping storage I/O off the loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         kettle_hal                           │
//! │                                                              │
//! │  ┌────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │ W1Probe /  │──►│ SmoothedSensor│──►│  SampledSensor   │──►│── loop
//! │  │ SimProbe   │   │  (5 samples)  │   │ (own thread)     │   │
//! │  └────────────┘   └───────────────┘   └──────────────────┘   │
//! │                                                              │
//! │  loop ──► GpioRelayBoard / SimRelays                         │
//! │  loop ──► WriteBehindStore ──► (own thread) ──► FileStore    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod alert;
pub mod drivers;
pub mod sampler;
pub mod smoothing;
pub mod store;
pub mod writer;

pub use crate::alert::LogAlertSink;
pub use crate::drivers::{open_hardware, HardwareSet};
pub use crate::sampler::SampledSensor;
pub use crate::smoothing::SmoothedSensor;
pub use crate::store::{FileStore, MemoryStore};
pub use crate::writer::WriteBehindStore;
