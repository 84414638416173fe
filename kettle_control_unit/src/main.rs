//! # Kettle Control Unit
//!
//! Loads the configuration, opens the probe and relay drivers (or the
//! simulated kettle), resumes an interrupted run when configured to, and
//! runs the control loop until SIGINT/SIGTERM.

use clap::Parser;
use kettle_common::clock::{Clock, SystemClock};
use kettle_common::hal::TemperatureSensor;
use kettle_common::config::LogLevel;
use kettle_control_unit::config::{load_config, log_summary, LoadedConfig};
use kettle_control_unit::cycle::{rt_setup, CycleRunner};
use kettle_control_unit::safety::recovery::restore_on_boot;
use kettle_control_unit::{Engine, KettleHandle};
use kettle_hal::{
    open_hardware, FileStore, LogAlertSink, SampledSensor, SmoothedSensor, WriteBehindStore,
};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Kettle Control Unit - brewing process controller
#[derive(Parser, Debug)]
#[command(name = "kettle_control_unit")]
#[command(version)]
#[command(about = "Recipe-driven temperature control loop for an electric brewing kettle")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(short, long, default_value = "config/kettle.toml")]
    config: PathBuf,

    /// Run against the simulated kettle instead of the probe and GPIO.
    #[arg(long)]
    simulate: bool,

    /// Override the data directory from the configuration.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let loaded = match load_config(&args.config) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, loaded.config.shared.log_level);

    info!("Kettle Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args, loaded) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Kettle Control Unit shutdown complete");
}

fn run(args: &Args, mut loaded: LoadedConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = &args.data_dir {
        loaded.config.storage.data_dir = dir.clone();
    }
    log_summary(&loaded);
    let config = loaded.config;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store = Arc::new(FileStore::open(&config.storage.data_dir)?);
    let persistence = Arc::new(WriteBehindStore::spawn(store.clone())?);

    let hw = open_hardware(&config, args.simulate, clock.clone())?;
    let smoothed = SmoothedSensor::new(hw.sensor);
    let sensor = SampledSensor::spawn(
        Box::new(smoothed),
        clock.clone(),
        Duration::from_millis(config.cycle.tick_ms),
        Duration::from_millis(config.cycle.sensor_stale_ms),
    )?;
    info!(sensor = sensor.name(), "Sensor ready");

    let mut engine = Engine::new(
        config.clone(),
        clock,
        Arc::new(LogAlertSink::new()),
        persistence.clone(),
    );
    if let Some(outcome) = restore_on_boot(&mut engine, store.as_ref(), config.storage.auto_resume)
    {
        info!(?outcome, "Boot recovery finished");
    }
    let handle = KettleHandle::new(engine);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    rt_setup(config.cycle.cpu_core, config.cycle.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        config.cycle.cpu_core, config.cycle.rt_priority
    );

    let mut runner = CycleRunner::new(handle.clone(), Box::new(sensor), hw.relays, &config.cycle);
    runner.run(&running)?;

    persistence.flush();
    let summary = handle.summary();
    info!(
        summary = %serde_json::to_string(&summary).unwrap_or_default(),
        "Final state"
    );
    Ok(())
}

/// Setup tracing subscriber. `-v` wins over the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        configured.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
