//! Lumped thermal model.
//!
//! One well-mixed body of water heated by the closed relays and losing
//! heat to ambient in proportion to the temperature difference:
//!
//! ```text
//! dT/dt = P·η / (m·c) · 1.8  −  k · (T − T_amb)        [°F/s]
//! ```
//!
//! The temperature never exceeds the boiling point; extra energy goes to
//! evaporation.

use kettle_common::consts::RELAY_COUNT;
use kettle_common::hal::RelayMask;

/// Specific heat of water [J/(kg·K)].
const WATER_SPECIFIC_HEAT: f64 = 4186.0;
/// Mass of one US gallon of water [kg].
const KG_PER_GALLON: f64 = 3.785;
/// Fraction of element power reaching the water.
const HEATER_EFFICIENCY: f64 = 0.85;
/// Newtonian loss coefficient [1/s].
const LOSS_COEFFICIENT: f64 = 5.0e-5;
/// Ambient and initial water temperature [°F].
const AMBIENT_TEMP: f64 = 70.0;

/// Kettle state integrated over monotonic time.
#[derive(Debug, Clone)]
pub struct ThermalModel {
    temp: f64,
    ambient: f64,
    volume_gal: f64,
    boil_temp: f64,
    relay_watts: [f64; RELAY_COUNT],
    mask: RelayMask,
    last_update: Option<f64>,
}

impl ThermalModel {
    pub fn new(relay_watts: [f64; RELAY_COUNT], volume_gal: f64, boil_temp: f64) -> Self {
        Self {
            temp: AMBIENT_TEMP,
            ambient: AMBIENT_TEMP,
            volume_gal: volume_gal.max(0.1),
            boil_temp,
            relay_watts,
            mask: RelayMask::empty(),
            last_update: None,
        }
    }

    /// Integrate up to monotonic time `now` [s].
    pub fn advance(&mut self, now: f64) {
        let Some(last) = self.last_update.replace(now) else {
            return;
        };
        let dt = now - last;
        if dt <= 0.0 {
            return;
        }
        let mass = self.volume_gal * KG_PER_GALLON;
        let watts = self.mask.watts(&self.relay_watts);
        let heating = watts * HEATER_EFFICIENCY / (mass * WATER_SPECIFIC_HEAT) * 1.8;
        let loss = LOSS_COEFFICIENT * (self.temp - self.ambient);
        self.temp = (self.temp + (heating - loss) * dt).min(self.boil_temp);
    }

    #[inline]
    pub const fn temperature(&self) -> f64 {
        self.temp
    }

    pub fn set_temperature(&mut self, temp: f64) {
        self.temp = temp;
    }

    pub fn set_volume(&mut self, volume_gal: f64) {
        self.volume_gal = volume_gal.max(0.1);
    }

    #[inline]
    pub const fn relays(&self) -> RelayMask {
        self.mask
    }

    pub fn set_relays(&mut self, mask: RelayMask) {
        self.mask = mask;
    }

    /// Power currently delivered by the closed relays [W].
    pub fn applied_watts(&self) -> f64 {
        self.mask.watts(&self.relay_watts)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
