//! DS18B20 probe on the Linux sysfs 1-Wire bus.
//!
//! The kernel exposes each probe as `<w1_root>/<id>/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line must end in `YES` (CRC ok); the second carries the
//! temperature in millidegrees Celsius. Readings are reported in °F.

use std::fs;
use std::path::{Path, PathBuf};

use kettle_common::hal::TemperatureSensor;
use tracing::debug;

/// Family prefix of DS18B20 devices.
const DS18B20_PREFIX: &str = "28-";
/// Sensor id meaning "no probe selected".
const UNASSIGNED: &str = "unassigned";

/// Parse the contents of a `w1_slave` file into °F.
pub fn parse_w1_slave(content: &str) -> Option<f64> {
    let mut lines = content.lines();
    if !lines.next()?.trim_end().ends_with("YES") {
        return None;
    }
    let data = lines.next()?;
    let pos = data.find("t=")?;
    let milli_c: f64 = data[pos + 2..].trim().parse().ok()?;
    let celsius = milli_c / 1000.0;
    Some(celsius * 9.0 / 5.0 + 32.0)
}

/// Ids of the DS18B20 probes present under `w1_root`, sorted.
pub fn scan_sensors(w1_root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(w1_root) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with(DS18B20_PREFIX))
        .collect();
    ids.sort();
    ids
}

/// One DS18B20 probe.
#[derive(Debug, Clone)]
pub struct W1Probe {
    sensor_id: String,
    path: PathBuf,
}

impl W1Probe {
    pub fn new(w1_root: &Path, sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            path: w1_root.join(sensor_id).join("w1_slave"),
        }
    }

    #[inline]
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
}

impl TemperatureSensor for W1Probe {
    fn name(&self) -> &'static str {
        "w1-ds18b20"
    }

    fn read_temperature(&mut self) -> Option<f64> {
        if self.sensor_id.is_empty() || self.sensor_id == UNASSIGNED {
            return None;
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => parse_w1_slave(&content),
            Err(e) => {
                debug!(path = %self.path.display(), "w1 read failed: {e}");
                None
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=100000\n";

    #[test]
    fn parses_millidegrees_to_fahrenheit() {
        assert_eq!(parse_w1_slave(GOOD), Some(212.0));
        let freezing = "xx : crc=00 YES\nxx t=0\n";
        assert_eq!(parse_w1_slave(freezing), Some(32.0));
    }

    #[test]
    fn rejects_bad_crc_and_missing_value() {
        assert_eq!(parse_w1_slave("xx : crc=00 NO\nxx t=20000\n"), None);
        assert_eq!(parse_w1_slave("xx : crc=00 YES\nxx\n"), None);
        assert_eq!(parse_w1_slave("xx : crc=00 YES\n"), None);
        assert_eq!(parse_w1_slave(""), None);
    }

    #[test]
    fn reads_and_scans_from_sysfs_tree() {
        let root = tempdir().unwrap();
        let dev = root.path().join("28-0000abc");
        fs::create_dir(&dev).unwrap();
        fs::create_dir(root.path().join("w1_bus_master1")).unwrap();
        fs::write(dev.join("w1_slave"), GOOD).unwrap();

        assert_eq!(scan_sensors(root.path()), vec!["28-0000abc".to_string()]);

        let mut probe = W1Probe::new(root.path(), "28-0000abc");
        assert_eq!(probe.read_temperature(), Some(212.0));

        let mut missing = W1Probe::new(root.path(), "28-gone");
        assert_eq!(missing.read_temperature(), None);

        let mut unassigned = W1Probe::new(root.path(), "unassigned");
        assert_eq!(unassigned.read_temperature(), None);
    }
}
