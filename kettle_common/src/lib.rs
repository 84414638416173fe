//! Kettle Common Library
//!
//! Shared vocabulary for every kettle workspace crate: the recipe data
//! model, run-state enums, recovery snapshots, the typed configuration
//! with its legacy migration, and the collaborator traits the control
//! engine drives (sensor, relays, alert sink, persistence, recipe source).
//!
//! # Module Structure
//!
//! - [`config`] - Versioned TOML configuration, loader trait, migration
//! - [`consts`] - Process constants and defaults
//! - [`clock`] - Monotonic + wall clock abstraction
//! - [`recipe`] - Recipe / Step / Addition model and JSON record migration
//! - [`state`] - Sequence status and pending-alert identity
//! - [`snapshot`] - Recovery snapshot projection
//! - [`hal`] - Sensor / actuator / alert collaborator traits
//! - [`store`] - Persistence and recipe-source collaborator traits
//! - [`prelude`] - Common re-exports for convenience

pub mod clock;
pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod recipe;
pub mod snapshot;
pub mod state;
pub mod store;
