//! Probe loss through the loop.

use kettle_common::recipe::CompletionPolicy;
use kettle_common::state::SequenceStatus;
use kettle_control_unit::Command;

use super::{recipe, step, Plant};

// ── Tests ──

#[test]
fn test_probe_dropout_opens_relays_and_recovers() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(120.0));
    p.apply(Command::LoadRecipe(recipe(vec![step(
        "Mash",
        152.0,
        60.0,
        CompletionPolicy::ManualAdvance,
    )])));
    p.apply(Command::Start);
    p.run_for(2.0);
    assert!(!p.kettle.relay_mask().is_empty());

    p.kettle.set_dropout(true);
    p.run_for(3.0);
    assert!(p.kettle.relay_mask().is_empty());
    assert_eq!(p.kettle.applied_watts(), 0.0);
    assert_eq!(p.handle().with(|e| e.current_temp()), None);
    let watch = p.runner.sensor_watch();
    assert!(!watch.is_available());
    assert_eq!(watch.outages(), 1);
    assert_eq!(watch.missed(), 30);

    // The sequence itself is untouched.
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Running);

    p.kettle.set_dropout(false);
    p.run_for(1.0);
    assert!(p.runner.sensor_watch().is_available());
    assert_eq!(p.handle().with(|e| e.current_temp()), Some(120.0));
    assert!(!p.kettle.relay_mask().is_empty());
    assert_eq!(p.runner.sensor_watch().outages(), 1);
}

#[test]
fn test_repeated_dropouts_are_counted_separately() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(120.0));
    p.apply(Command::EnterManual);
    p.apply(Command::StartManual);

    for _ in 0..3 {
        p.kettle.set_dropout(true);
        p.run_for(0.5);
        assert!(p.kettle.relay_mask().is_empty());
        p.kettle.set_dropout(false);
        p.run_for(0.5);
        assert!(!p.kettle.relay_mask().is_empty());
    }
    assert_eq!(p.runner.sensor_watch().outages(), 3);
}

#[test]
fn test_dropout_while_idle_keeps_everything_off() {
    let mut p = Plant::new();
    p.kettle.set_dropout(true);
    p.run_for(1.0);
    assert!(p.kettle.relay_mask().is_empty());
    assert_eq!(p.handle().summary().status, SequenceStatus::Idle);
}
