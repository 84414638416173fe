//! Shared plant rig and test modules.

mod delayed_start;
mod fail_safe;
mod persistence;
mod properties;
mod recovery;
mod sequence_flow;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use kettle_common::clock::ManualClock;
use kettle_common::config::KettleConfig;
use kettle_common::recipe::{CompletionPolicy, Recipe, Step, StepKind};
use kettle_control_unit::cycle::CycleRunner;
use kettle_control_unit::{Command, CommandOutcome, Engine, KettleHandle};
use kettle_hal::drivers::simulation::SimulatedKettle;
use kettle_hal::{LogAlertSink, MemoryStore};

// ── Helpers ──

pub const TICK_S: f64 = 0.1;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
}

/// Engine, loop and simulated kettle on one manual clock.
pub struct Plant {
    pub clock: ManualClock,
    pub kettle: SimulatedKettle,
    pub alerts: Arc<LogAlertSink>,
    pub store: Arc<MemoryStore>,
    pub runner: CycleRunner,
}

impl Plant {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let clock = ManualClock::new(0.0, t0());
        let config = KettleConfig::default();
        let kettle = SimulatedKettle::new(&config, Arc::new(clock.clone()));
        let alerts = Arc::new(LogAlertSink::new());
        let engine = Engine::new(
            config.clone(),
            Arc::new(clock.clone()),
            alerts.clone(),
            store.clone(),
        );
        let runner = CycleRunner::new(
            KettleHandle::new(engine),
            Box::new(kettle.probe()),
            Box::new(kettle.relays()),
            &config.cycle,
        );
        Self {
            clock,
            kettle,
            alerts,
            store,
            runner,
        }
    }

    pub fn handle(&self) -> &KettleHandle {
        self.runner.handle()
    }

    pub fn apply(&self, cmd: Command) -> CommandOutcome {
        self.handle().apply(cmd)
    }

    /// Advance the clock and run one cycle per tick for `secs`.
    pub fn run_for(&mut self, secs: f64) {
        let ticks = (secs / TICK_S).round() as u64;
        for _ in 0..ticks {
            self.clock.advance(TICK_S);
            self.runner.step();
        }
    }

    /// Run until `done` holds or `max_secs` pass. Returns the seconds run.
    pub fn run_until(&mut self, max_secs: f64, done: impl Fn(&Engine) -> bool) -> f64 {
        let mut t = 0.0;
        while t < max_secs {
            if self.handle().with(|e| done(e)) {
                break;
            }
            self.clock.advance(TICK_S);
            self.runner.step();
            t += TICK_S;
        }
        t
    }
}

pub fn step(name: &str, setpoint: f64, duration_min: f64, policy: CompletionPolicy) -> Step {
    Step {
        id: name.to_lowercase(),
        name: name.into(),
        kind: StepKind::Mash,
        note: String::new(),
        setpoint: Some(setpoint),
        fallback_temp: None,
        duration_min,
        ramp_power_watts: Some(1800.0),
        hold_power_watts: Some(1800.0),
        policy,
        additions: Vec::new(),
        volume: Some(5.0),
    }
}

pub fn recipe(steps: Vec<Step>) -> Recipe {
    Recipe::new("it", "Integration Brew", steps)
}
