//! Sensor fail-safe tracking.
//!
//! The control loop forces every relay open on any tick without a usable
//! reading. [`SensorWatch`] turns the per-tick availability into edge
//! events so the loss and the recovery are each logged once.

/// Availability edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorTransition {
    Lost,
    Restored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorWatch {
    available: bool,
    /// Ticks without a reading since the last loss.
    missed: u64,
    /// Losses since process start.
    outages: u64,
}

impl Default for SensorWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorWatch {
    /// Starts out assuming the sensor is available.
    pub const fn new() -> Self {
        Self {
            available: true,
            missed: 0,
            outages: 0,
        }
    }

    #[inline]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    #[inline]
    pub const fn missed(&self) -> u64 {
        self.missed
    }

    #[inline]
    pub const fn outages(&self) -> u64 {
        self.outages
    }

    /// Record one tick. Returns the edge, if this tick crossed one.
    pub fn observe(&mut self, has_reading: bool) -> Option<SensorTransition> {
        match (self.available, has_reading) {
            (true, false) => {
                self.available = false;
                self.missed = 1;
                self.outages += 1;
                Some(SensorTransition::Lost)
            }
            (false, false) => {
                self.missed += 1;
                None
            }
            (false, true) => {
                self.available = true;
                Some(SensorTransition::Restored)
            }
            (true, true) => None,
        }
    }
}
