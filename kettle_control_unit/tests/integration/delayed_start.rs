//! Delayed start against the wall clock.

use chrono::TimeDelta;
use kettle_common::recipe::CompletionPolicy;
use kettle_common::state::{RunOrigin, SequenceStatus};
use kettle_control_unit::Command;

use super::{recipe, step, t0, Plant};

// ── Helpers ──

fn schedule(p: &Plant, hours: i64, origin: Option<RunOrigin>) {
    let outcome = p.apply(Command::ScheduleDelayed {
        target_temp: 150.0,
        volume: 6.0,
        ready_at: t0() + TimeDelta::hours(hours),
        origin,
    });
    assert!(outcome.is_applied());
}

fn fire_at(p: &Plant) -> chrono::DateTime<chrono::Utc> {
    p.handle().with(|e| e.delayed().unwrap().fire_at)
}

// ── Tests ──

#[test]
fn test_manual_origin_fires_into_manual_session() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(60.0));
    p.apply(Command::EnterManual);
    p.run_for(1.0);

    schedule(&p, 3, None);
    let fire = fire_at(&p);
    assert!(fire > t0() && fire < t0() + TimeDelta::hours(3));
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::DelayedWait);
    assert_eq!(p.handle().with(|e| e.display_timer()), "30:00");

    p.run_for(60.0);
    assert!(p.kettle.relay_mask().is_empty());
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::DelayedWait);

    p.clock.set_wall(fire + TimeDelta::seconds(1));
    p.run_for(0.5);
    let (status, target, timer, running) = p.handle().with(|e| {
        let m = e.manual();
        (e.status(), m.target_temp, m.timer_duration, m.running)
    });
    assert_eq!(status, SequenceStatus::Manual);
    assert_eq!(target, 150.0);
    assert_eq!(timer, 1800.0);
    assert!(running);
    assert!(!p.kettle.relay_mask().is_empty());
}

#[test]
fn test_recipe_origin_starts_loaded_recipe() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(60.0));
    p.apply(Command::LoadRecipe(recipe(vec![step(
        "Mash",
        152.0,
        60.0,
        CompletionPolicy::ManualAdvance,
    )])));
    p.run_for(1.0);
    schedule(&p, 2, None);
    assert_eq!(
        p.handle().with(|e| e.delayed().unwrap().origin),
        RunOrigin::Recipe
    );

    let fire = fire_at(&p);
    p.clock.set_wall(fire);
    p.run_for(0.5);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Running);
    assert_eq!(p.handle().with(|e| e.step_index()), Some(0));
}

#[test]
fn test_recipe_origin_without_recipe_falls_back_to_manual() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(60.0));
    p.run_for(1.0);
    schedule(&p, 2, Some(RunOrigin::Recipe));
    let fire = fire_at(&p);
    p.clock.set_wall(fire);
    p.run_for(0.5);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Manual);
    assert!(p.handle().with(|e| e.manual().running));
}

#[test]
fn test_cancel_returns_to_scheduling_context() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(60.0));
    p.run_for(1.0);

    schedule(&p, 2, None);
    assert!(p.apply(Command::CancelDelayed).is_applied());
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Idle);
    assert!(p.store.recovery().is_none());

    p.apply(Command::EnterManual);
    schedule(&p, 2, None);
    assert!(p.apply(Command::CancelDelayed).is_applied());
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Manual);

    assert!(!p.apply(Command::CancelDelayed).is_applied());
}

#[test]
fn test_pending_delayed_start_survives_restart() {
    let store = std::sync::Arc::new(kettle_hal::MemoryStore::new());
    let fire = {
        let mut p = Plant::with_store(store.clone());
        p.kettle.set_virtual_temp(Some(60.0));
        p.run_for(1.0);
        schedule(&p, 4, Some(RunOrigin::Manual));
        fire_at(&p)
    };

    let mut p = Plant::with_store(store.clone());
    p.kettle.set_virtual_temp(Some(60.0));
    p.handle().with(|e| {
        kettle_control_unit::safety::recovery::restore_on_boot(e, store.as_ref(), true)
    });
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::DelayedWait);
    assert_eq!(fire_at(&p), fire);
    assert_eq!(p.handle().with(|e| e.manual().timer_duration), 1800.0);

    p.clock.set_wall(fire);
    p.run_for(0.5);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Manual);
}
