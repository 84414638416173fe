//! Recipe runs through the closed loop.

use kettle_common::recipe::{Addition, CompletionPolicy};
use kettle_common::state::{PendingAlert, SequenceStatus};
use kettle_control_unit::Command;

use super::{recipe, step, Plant};

// ── Tests ──

#[test]
fn test_two_step_recipe_heats_holds_and_completes() {
    let mut p = Plant::new();
    p.kettle.set_water(75.0, 5.0);
    p.apply(Command::LoadRecipe(recipe(vec![
        step("Rest", 80.0, 1.0, CompletionPolicy::AutoAdvance),
        step("Warm", 84.0, 1.0, CompletionPolicy::EndProgram),
    ])));
    assert!(p.apply(Command::Start).is_applied());

    let heated = p.run_until(1800.0, |e| e.step_index() == Some(1));
    assert!(heated < 1800.0, "first step never finished");
    assert!(p.kettle.water_temperature() > 79.0);

    p.run_until(1800.0, |e| e.status() == SequenceStatus::WaitingForUser);
    let pending = p.handle().with(|e| e.pending_alert().cloned());
    assert!(matches!(pending, Some(PendingAlert::StepComplete { step_index: 1, .. })));
    assert_eq!(p.handle().with(|e| e.status_text()), "DONE:\nWarm");

    assert!(p.apply(Command::Advance).is_applied());
    p.run_for(1.0);
    let s = p.handle().summary();
    assert_eq!(s.status, SequenceStatus::Completed);
    assert_eq!(s.text, "Brew Complete");
    assert!(s.kwh > 0.0);
    assert!(p.kettle.relay_mask().is_empty());
    assert!(p.store.recovery().is_none());
    assert!(p.alerts.plays() >= 2);
}

#[test]
fn test_addition_waits_for_operator_without_pausing_step() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(152.0));
    let mut mash = step("Mash", 152.0, 10.0, CompletionPolicy::ManualAdvance);
    mash.additions = vec![Addition::new("sg", "Take SG reading", 5.0)];
    p.apply(Command::LoadRecipe(recipe(vec![mash])));
    p.apply(Command::Start);

    p.run_for(5.5);
    assert!(p.handle().with(|e| e.temp_reached()));
    assert_eq!(
        p.handle().with(|e| e.upcoming_addition_text()),
        "Next: Take SG reading @ 5m"
    );

    p.run_for(301.0);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::WaitingForUser);
    assert_eq!(p.handle().with(|e| e.status_text()), "ALERT: Take SG reading");

    p.run_for(20.0);
    assert!(p.apply(Command::Resume).is_applied());
    assert_eq!(
        p.handle().with(|e| e.upcoming_addition_text()),
        "No more alerts"
    );

    // The twenty seconds spent on the alert already counted.
    p.run_for(285.0);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::WaitingForUser);
    assert!(p
        .handle()
        .with(|e| e.pending_alert().is_some_and(|a| a.is_step_complete())));
}

#[test]
fn test_pause_excludes_time_from_step_and_program() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(152.0));
    p.apply(Command::LoadRecipe(recipe(vec![step(
        "Mash",
        152.0,
        60.0,
        CompletionPolicy::ManualAdvance,
    )])));
    p.apply(Command::Start);
    p.run_for(65.0);

    let before = p.handle().with(|e| (e.step_run().unwrap().elapsed, e.global_elapsed()));
    p.apply(Command::Pause);
    p.run_for(600.0);
    assert_eq!(
        p.handle().with(|e| e.status_text()),
        "PAUSED - Step 1: Mash"
    );
    p.apply(Command::Resume);
    p.run_for(10.0);

    let (step_elapsed, global) = p.handle().with(|e| (e.step_run().unwrap().elapsed, e.global_elapsed()));
    assert!((step_elapsed - before.0 - 10.0).abs() < 0.2, "{step_elapsed}");
    assert!((global - before.1 - 10.0).abs() < 0.2, "{global}");
}

#[test]
fn test_reset_rewinds_and_rearms_additions() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(200.0));
    let mut first = step("Dough-in", 150.0, 0.0, CompletionPolicy::AutoAdvance);
    first.additions = vec![Addition::new("d", "Dough-in", 0.0)];
    p.apply(Command::LoadRecipe(recipe(vec![
        first,
        step("Mash", 152.0, 60.0, CompletionPolicy::ManualAdvance),
    ])));
    p.apply(Command::Start);
    p.run_for(5.5);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::WaitingForUser);
    p.apply(Command::Resume);
    p.run_for(0.2);
    assert_eq!(p.handle().with(|e| e.step_index()), Some(1));

    p.apply(Command::Reset);
    let (status, index, fired) = p.handle().with(|e| {
        let r = e.recipe().unwrap();
        (e.status(), e.step_index(), r.steps[0].additions[0].triggered)
    });
    assert_eq!(status, SequenceStatus::Idle);
    assert_eq!(index, Some(0));
    assert!(!fired);
}

#[test]
fn test_manual_session_counts_down_after_latch() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(149.8));
    p.apply(Command::EnterManual);
    p.apply(Command::SetManualTarget(150.0));
    p.apply(Command::SetManualTimerDuration(1.0));
    p.apply(Command::StartManual);

    p.run_for(5.5);
    assert!(p.handle().with(|e| e.temp_reached()));
    p.run_for(30.0);
    let timer = p.handle().with(|e| e.display_timer());
    assert!(timer == "00:30" || timer == "00:31", "{timer}");

    p.run_for(31.0);
    let s = p.handle().summary();
    assert_eq!(s.status, SequenceStatus::Manual);
    assert!(!p.handle().with(|e| e.manual().running));
    assert!(p.kettle.relay_mask().is_empty());
    assert_eq!(p.store.manual_defaults().unwrap().timer_min, 1.0);
}

#[test]
fn test_hard_stop_holds_relays_open_until_resume() {
    let mut p = Plant::new();
    p.kettle.set_virtual_temp(Some(100.0));
    p.apply(Command::LoadRecipe(recipe(vec![step(
        "Mash",
        152.0,
        60.0,
        CompletionPolicy::ManualAdvance,
    )])));
    p.apply(Command::Start);
    p.run_for(1.0);
    assert_eq!(p.kettle.applied_watts(), 1800.0);

    assert!(p.apply(Command::HardStop).is_applied());
    p.run_for(1.0);
    assert!(p.kettle.relay_mask().is_empty());
    assert!(p.handle().summary().hard_stop);

    // Pause is not a way out.
    p.apply(Command::Pause);
    p.run_for(1.0);
    assert!(p.kettle.relay_mask().is_empty());

    assert!(p.apply(Command::Resume).is_applied());
    p.run_for(1.0);
    assert_eq!(p.handle().with(|e| e.status()), SequenceStatus::Running);
    assert!(!p.handle().with(|e| e.is_hard_stopped()));
    assert_eq!(p.kettle.applied_watts(), 1800.0);
}
