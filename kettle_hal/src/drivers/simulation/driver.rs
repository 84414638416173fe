//! Simulated probe and relay bank.
//!
//! `SimulatedKettle` owns the thermal model; [`SimProbe`] and
//! [`SimRelays`] are cheap handles onto it that implement the sensor and
//! actuator traits, so the sampler thread and the control loop can each
//! hold one.

use std::sync::Arc;

use kettle_common::clock::Clock;
use kettle_common::config::KettleConfig;
use kettle_common::hal::{HalError, RelayActuator, RelayMask, TemperatureSensor};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::model::ThermalModel;

#[derive(Debug)]
struct SimState {
    model: ThermalModel,
    /// Developer override pinning the probe reading.
    virtual_temp: Option<f64>,
    /// Probe reports nothing while set.
    dropout: bool,
}

/// Shared simulation handle.
#[derive(Clone)]
pub struct SimulatedKettle {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedKettle {
    pub fn new(config: &KettleConfig, clock: Arc<dyn Clock>) -> Self {
        let model = ThermalModel::new(
            config.heater.relay_watts,
            config.calibration.ref_volume,
            config.process.boil_temp,
        );
        Self::with_model(model, clock)
    }

    pub fn with_model(model: ThermalModel, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                model,
                virtual_temp: None,
                dropout: false,
            })),
            clock,
        }
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe { kettle: self.clone() }
    }

    pub fn relays(&self) -> SimRelays {
        SimRelays { kettle: self.clone() }
    }

    /// Modelled water temperature, ignoring any override.
    pub fn water_temperature(&self) -> f64 {
        let mut s = self.state.lock();
        s.model.advance(self.clock.monotonic());
        s.model.temperature()
    }

    /// Pin the probe reading (`None` releases it).
    pub fn set_virtual_temp(&self, temp: Option<f64>) {
        info!(?temp, "Simulation virtual temperature");
        self.state.lock().virtual_temp = temp;
    }

    /// Make the probe report no reading.
    pub fn set_dropout(&self, dropout: bool) {
        info!(dropout, "Simulation probe dropout");
        self.state.lock().dropout = dropout;
    }

    pub fn set_water(&self, temp: f64, volume_gal: f64) {
        let mut s = self.state.lock();
        s.model.set_temperature(temp);
        s.model.set_volume(volume_gal);
    }

    /// Relay state last written by the control loop.
    pub fn relay_mask(&self) -> RelayMask {
        self.state.lock().model.relays()
    }

    pub fn applied_watts(&self) -> f64 {
        self.state.lock().model.applied_watts()
    }
}

/// Probe side of the simulation.
pub struct SimProbe {
    kettle: SimulatedKettle,
}

impl TemperatureSensor for SimProbe {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn read_temperature(&mut self) -> Option<f64> {
        let now = self.kettle.clock.monotonic();
        let mut s = self.kettle.state.lock();
        s.model.advance(now);
        if s.dropout {
            return None;
        }
        Some(s.virtual_temp.unwrap_or_else(|| s.model.temperature()))
    }
}

/// Relay side of the simulation.
pub struct SimRelays {
    kettle: SimulatedKettle,
}

impl RelayActuator for SimRelays {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn set_relays(&mut self, mask: RelayMask) -> Result<(), HalError> {
        let now = self.kettle.clock.monotonic();
        let mut s = self.kettle.state.lock();
        // Integrate under the old mask before switching.
        s.model.advance(now);
        if s.model.relays() != mask {
            debug!(?mask, "Simulated relays switched");
        }
        s.model.set_relays(mask);
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), HalError> {
        self.stop_all()?;
        info!("Simulated relays released");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kettle_common::clock::ManualClock;

    fn kettle() -> (SimulatedKettle, ManualClock) {
        let clock = ManualClock::new(0.0, Utc::now());
        let kettle = SimulatedKettle::new(&KettleConfig::default(), Arc::new(clock.clone()));
        (kettle, clock)
    }

    #[test]
    fn relays_heat_the_probe_reading() {
        let (kettle, clock) = kettle();
        let mut probe = kettle.probe();
        let mut relays = kettle.relays();

        let start = probe.read_temperature().unwrap();
        relays.set_relays(RelayMask::all()).unwrap();
        clock.advance(120.0);
        let later = probe.read_temperature().unwrap();
        assert!(later > start + 2.0, "{start} -> {later}");
        assert_eq!(kettle.applied_watts(), 2800.0);
    }

    #[test]
    fn virtual_temp_and_dropout() {
        let (kettle, _clock) = kettle();
        let mut probe = kettle.probe();

        kettle.set_virtual_temp(Some(152.0));
        assert_eq!(probe.read_temperature(), Some(152.0));

        kettle.set_dropout(true);
        assert_eq!(probe.read_temperature(), None);

        kettle.set_dropout(false);
        kettle.set_virtual_temp(None);
        assert_eq!(probe.read_temperature(), Some(70.0));
    }

    #[test]
    fn cleanup_opens_relays() {
        let (kettle, _clock) = kettle();
        let mut relays = kettle.relays();
        relays.set_relays(RelayMask::R2).unwrap();
        relays.cleanup().unwrap();
        assert!(kettle.relay_mask().is_empty());
    }
}
