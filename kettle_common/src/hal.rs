//! Hardware collaborator traits and error types.
//!
//! This module defines:
//! - `TemperatureSensor` - probe interface
//! - `RelayActuator` - heater relay bank interface
//! - `AlertSink` - operator alert output
//! - `RelayMask` - on/off state of the relay bank
//! - `HalError` - error type for hardware operations
//!
//! # Timing Contracts
//!
//! | Operation             | Called from   | Constraint                     |
//! |-----------------------|---------------|--------------------------------|
//! | `read_temperature()`  | sampler thread| may block; never on the loop   |
//! | `set_relays()`        | control loop  | every tick, must be bounded    |
//! | `stop_all()`          | any           | must succeed without prior init|
//! | `play_alert()`        | control loop  | fire-and-forget, non-blocking  |

use bitflags::bitflags;
use static_assertions::const_assert;
use thiserror::Error;

use crate::consts::RELAY_COUNT;

/// Error types for hardware operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),
}

// One bit per relay.
const_assert!(RELAY_COUNT <= 8);

bitflags! {
    /// Relay bank state, bit `i` = relay `i` closed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RelayMask: u8 {
        const R1 = 1 << 0;
        const R2 = 1 << 1;
        const R3 = 1 << 2;
    }
}

impl RelayMask {
    /// Mask with only relay `index` set.
    #[inline]
    pub const fn relay(index: usize) -> Self {
        Self::from_bits_truncate(1u8 << index)
    }

    #[inline]
    pub const fn is_on(self, index: usize) -> bool {
        self.bits() & (1u8 << index) != 0
    }

    /// Per-relay booleans, relay 0 first.
    pub fn states(self) -> [bool; RELAY_COUNT] {
        std::array::from_fn(|i| self.is_on(i))
    }

    pub fn from_states(states: [bool; RELAY_COUNT]) -> Self {
        states
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .fold(Self::empty(), |m, (i, _)| m | Self::relay(i))
    }

    /// Combined wattage of the closed relays.
    pub fn watts(self, relay_watts: &[f64; RELAY_COUNT]) -> f64 {
        relay_watts
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_on(*i))
            .map(|(_, w)| *w)
            .sum()
    }
}

/// Temperature probe.
pub trait TemperatureSensor: Send {
    /// Returns the driver's identifier.
    fn name(&self) -> &'static str;

    /// Latest temperature, or `None` when no trustworthy reading exists.
    fn read_temperature(&mut self) -> Option<f64>;
}

/// Heater relay bank.
pub trait RelayActuator: Send {
    /// Returns the driver's identifier.
    fn name(&self) -> &'static str;

    /// Drive every relay to the state in `mask`.
    fn set_relays(&mut self, mask: RelayMask) -> Result<(), HalError>;

    /// Open every relay.
    fn stop_all(&mut self) -> Result<(), HalError> {
        self.set_relays(RelayMask::empty())
    }

    /// Open every relay and release hardware handles.
    fn cleanup(&mut self) -> Result<(), HalError> {
        self.stop_all()
    }
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn read_temperature(&mut self) -> Option<f64> {
        (**self).read_temperature()
    }
}

impl<T: RelayActuator + ?Sized> RelayActuator for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn set_relays(&mut self, mask: RelayMask) -> Result<(), HalError> {
        (**self).set_relays(mask)
    }

    fn stop_all(&mut self) -> Result<(), HalError> {
        (**self).stop_all()
    }

    fn cleanup(&mut self) -> Result<(), HalError> {
        (**self).cleanup()
    }
}

/// Operator alert output (chime, buzzer, notification).
pub trait AlertSink: Send + Sync {
    fn play_alert(&self);
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_states_round_trip() {
        let m = RelayMask::from_states([true, false, true]);
        assert_eq!(m, RelayMask::R1 | RelayMask::R3);
        assert_eq!(m.states(), [true, false, true]);
        assert!(RelayMask::relay(1) == RelayMask::R2);
    }

    #[test]
    fn mask_watts() {
        let caps = [1000.0, 800.0, 1000.0];
        assert_eq!((RelayMask::R1 | RelayMask::R2).watts(&caps), 1800.0);
        assert_eq!(RelayMask::empty().watts(&caps), 0.0);
        assert_eq!(RelayMask::all().watts(&caps), 2800.0);
    }
}
