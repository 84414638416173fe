//! Startup configuration loading.
//!
//! A missing file is not an error: the controller runs on defaults and
//! says so. A file that exists but does not parse or validate is fatal.
//!
//! Loading happens before the tracing subscriber exists (the file picks
//! the log level), so nothing here logs until [`log_summary`].

use std::path::{Path, PathBuf};

use kettle_common::config::{ConfigError, KettleConfig};
use tracing::{info, warn};

/// Where the running configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Validated configuration, ready for runtime use.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KettleConfig,
    pub source: ConfigSource,
}

/// Load and validate `path`, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    match KettleConfig::load_file(path) {
        Ok(config) => Ok(LoadedConfig {
            config,
            source: ConfigSource::File(path.to_path_buf()),
        }),
        Err(ConfigError::FileNotFound) => Ok(LoadedConfig {
            config: KettleConfig::default(),
            source: ConfigSource::Defaults,
        }),
        Err(e) => Err(e),
    }
}

/// One line with the settings that matter at startup.
pub fn log_summary(loaded: &LoadedConfig) {
    let c = &loaded.config;
    let source = match &loaded.source {
        ConfigSource::File(p) => p.display().to_string(),
        ConfigSource::Defaults => {
            warn!("Configuration file not found, using defaults");
            "defaults".to_string()
        }
    };
    info!(
        %source,
        tick_ms = c.cycle.tick_ms,
        relay_watts = ?c.heater.relay_watts,
        pwm_cycle_s = c.heater.pwm_cycle_s,
        boil = c.process.boil_temp,
        kp = c.pid.kp,
        ki = c.pid.ki,
        kd = c.pid.kd,
        data_dir = %c.storage.data_dir.display(),
        auto_resume = c.storage.auto_resume,
        "Configuration loaded"
    );
}

// ─── Tests ──────────────────────────────────────────────────────────
