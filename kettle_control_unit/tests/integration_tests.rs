//! Integration tests for the Kettle Control Unit.
//!
//! These tests close the loop through the cycle runner and the simulated
//! kettle, driving realistic brew-day workflows that span the engine,
//! safety, recovery and control primitives.

mod integration;
