//! Storage latency stays off the control tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kettle_common::clock::ManualClock;
use kettle_common::config::{KettleConfig, ManualDefaults};
use kettle_common::recipe::CompletionPolicy;
use kettle_common::snapshot::RecoverySnapshot;
use kettle_common::state::SequenceStatus;
use kettle_common::store::{Persistence, StoreError};
use kettle_control_unit::Engine;
use kettle_hal::{LogAlertSink, MemoryStore, WriteBehindStore};

use super::{recipe, step, t0, TICK_S};

// ── Helpers ──

const STALL: Duration = Duration::from_millis(400);

/// Every write takes `STALL`, like a card in the middle of an erase.
struct StallingStore {
    mem: MemoryStore,
}

impl Persistence for StallingStore {
    fn save_recovery_state(&self, snapshot: &RecoverySnapshot) -> Result<(), StoreError> {
        std::thread::sleep(STALL);
        self.mem.save_recovery_state(snapshot)
    }

    fn get_recovery_state(&self) -> Result<Option<RecoverySnapshot>, StoreError> {
        self.mem.get_recovery_state()
    }

    fn clear_recovery_state(&self) -> Result<(), StoreError> {
        std::thread::sleep(STALL);
        self.mem.clear_recovery_state()
    }

    fn save_manual_defaults(&self, defaults: &ManualDefaults) -> Result<(), StoreError> {
        std::thread::sleep(STALL);
        self.mem.save_manual_defaults(defaults)
    }

    fn load_manual_defaults(&self) -> Result<Option<ManualDefaults>, StoreError> {
        self.mem.load_manual_defaults()
    }

    fn save_last_recipe_id(&self, id: &str) -> Result<(), StoreError> {
        std::thread::sleep(STALL);
        self.mem.save_last_recipe_id(id)
    }

    fn last_recipe_id(&self) -> Result<Option<String>, StoreError> {
        self.mem.last_recipe_id()
    }
}

// ── Tests ──

#[test]
fn test_slow_storage_does_not_stretch_ticks() {
    let slow = Arc::new(StallingStore {
        mem: MemoryStore::new(),
    });
    let store = Arc::new(WriteBehindStore::spawn(slow.clone()).unwrap());
    let clock = ManualClock::new(0.0, t0());
    let mut engine = Engine::new(
        KettleConfig::default(),
        Arc::new(clock.clone()),
        Arc::new(LogAlertSink::new()),
        store.clone(),
    );

    engine.load_recipe(recipe(vec![step(
        "Mash",
        152.0,
        60.0,
        CompletionPolicy::ManualAdvance,
    )]));
    assert!(engine.start().is_applied());

    // Latch closes about 5 s in and writes a snapshot from inside the tick.
    let mut worst = Duration::ZERO;
    for _ in 0..80 {
        clock.advance(TICK_S);
        let began = Instant::now();
        engine.tick(Some(152.0)).unwrap();
        worst = worst.max(began.elapsed());
    }
    assert!(engine.temp_reached());
    assert!(worst < Duration::from_millis(100), "worst tick {worst:?}");

    store.flush();
    match slow.mem.recovery() {
        Some(RecoverySnapshot::Recipe(p)) => {
            assert!(p.temp_reached);
            assert_eq!(p.status, SequenceStatus::Running);
        }
        other => panic!("expected a recipe snapshot, got {other:?}"),
    }
}

#[test]
fn test_stop_clears_snapshot_through_writer() {
    let slow = Arc::new(StallingStore {
        mem: MemoryStore::new(),
    });
    let store = Arc::new(WriteBehindStore::spawn(slow.clone()).unwrap());
    let clock = ManualClock::new(0.0, t0());
    let mut engine = Engine::new(
        KettleConfig::default(),
        Arc::new(clock.clone()),
        Arc::new(LogAlertSink::new()),
        store.clone(),
    );

    engine.enter_manual();
    engine.start_manual();
    let began = Instant::now();
    engine.stop();
    assert!(began.elapsed() < Duration::from_millis(100));

    store.flush();
    assert!(slow.mem.recovery().is_none());
}
