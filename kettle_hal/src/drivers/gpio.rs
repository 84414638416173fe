//! Relay board on the sysfs GPIO interface.
//!
//! Each relay pin is exported once and set as an output. Relay boards are
//! commonly active-low (a low level closes the relay); `active_high`
//! selects the other polarity. Opening the board drives every pin to its
//! OFF level before returning.

use std::fs;
use std::path::{Path, PathBuf};

use kettle_common::consts::RELAY_COUNT;
use kettle_common::hal::{HalError, RelayActuator, RelayMask};
use tracing::{debug, info};

/// sysfs relay board.
#[derive(Debug)]
pub struct GpioRelayBoard {
    root: PathBuf,
    pins: [u32; RELAY_COUNT],
    active_high: bool,
}

impl GpioRelayBoard {
    /// Export and configure the pins, then open every relay.
    pub fn open(root: &Path, pins: [u32; RELAY_COUNT], active_high: bool) -> Result<Self, HalError> {
        let mut board = Self {
            root: root.to_path_buf(),
            pins,
            active_high,
        };
        for pin in pins {
            board.export(pin)?;
            write_attr(&board.pin_dir(pin).join("direction"), "out")
                .map_err(|e| HalError::InitFailed(format!("gpio{pin} direction: {e}")))?;
        }
        board
            .stop_all()
            .map_err(|e| HalError::InitFailed(e.to_string()))?;
        info!(
            "Relay board ready ({} mode)",
            if active_high { "active high" } else { "active low" }
        );
        Ok(board)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export(&self, pin: u32) -> Result<(), HalError> {
        if self.pin_dir(pin).exists() {
            return Ok(());
        }
        debug!(pin, "Exporting GPIO");
        write_attr(&self.root.join("export"), &pin.to_string())
            .map_err(|e| HalError::InitFailed(format!("export gpio{pin}: {e}")))
    }

    /// Electrical level for a logical relay state.
    #[inline]
    pub const fn level(&self, on: bool) -> &'static str {
        if on == self.active_high { "1" } else { "0" }
    }
}

fn write_attr(path: &Path, value: &str) -> std::io::Result<()> {
    fs::write(path, value)
}

impl RelayActuator for GpioRelayBoard {
    fn name(&self) -> &'static str {
        "gpio-sysfs"
    }

    fn set_relays(&mut self, mask: RelayMask) -> Result<(), HalError> {
        // Attempt every pin even if one fails; report the first failure.
        let mut first_err = None;
        for (i, pin) in self.pins.iter().enumerate() {
            let value = self.level(mask.is_on(i));
            if let Err(e) = write_attr(&self.pin_dir(*pin).join("value"), value) {
                first_err.get_or_insert(HalError::CommunicationError(format!(
                    "gpio{pin} value: {e}"
                )));
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn cleanup(&mut self) -> Result<(), HalError> {
        self.stop_all()?;
        for pin in self.pins {
            // Unexport is best effort; the pins are already at OFF.
            let _ = write_attr(&self.root.join("unexport"), &pin.to_string());
        }
        info!("Relay board released");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
