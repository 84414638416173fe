//! Sensor and relay drivers.
//!
//! - [`simulation`] - thermal model standing in for the kettle
//! - [`w1`] - DS18B20 probe on the sysfs 1-Wire bus
//! - [`gpio`] - relay board on sysfs GPIO
//!
//! [`open_hardware`] picks the pair to use at startup.

pub mod gpio;
pub mod simulation;
pub mod w1;

use std::sync::Arc;

use kettle_common::clock::Clock;
use kettle_common::config::KettleConfig;
use kettle_common::hal::{HalError, RelayActuator, TemperatureSensor};
use tracing::info;

use self::gpio::GpioRelayBoard;
use self::simulation::SimulatedKettle;
use self::w1::W1Probe;

/// Sensor and relay drivers opened together.
pub struct HardwareSet {
    pub sensor: Box<dyn TemperatureSensor>,
    pub relays: Box<dyn RelayActuator>,
    /// Handle to the thermal model when running simulated.
    pub simulation: Option<SimulatedKettle>,
}

/// Open the physical drivers, or the simulation when `simulate` is set.
pub fn open_hardware(
    config: &KettleConfig,
    simulate: bool,
    clock: Arc<dyn Clock>,
) -> Result<HardwareSet, HalError> {
    if simulate {
        let kettle = SimulatedKettle::new(config, clock);
        info!("Opened simulated kettle");
        return Ok(HardwareSet {
            sensor: Box::new(kettle.probe()),
            relays: Box::new(kettle.relays()),
            simulation: Some(kettle),
        });
    }

    let hw = &config.hardware;
    let relays = GpioRelayBoard::open(&hw.gpio_root, hw.relay_pins, hw.relay_active_high)?;
    let sensor = W1Probe::new(&hw.w1_root, &hw.sensor_id);
    info!(
        sensor = %hw.sensor_id,
        pins = ?hw.relay_pins,
        active_high = hw.relay_active_high,
        "Opened physical hardware"
    );
    Ok(HardwareSet {
        sensor: Box::new(sensor),
        relays: Box::new(relays),
        simulation: None,
    })
}
