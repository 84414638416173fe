//! Power loss in the middle of a run, then a fresh process on the same
//! store.

use std::sync::Arc;

use kettle_common::recipe::{Addition, CompletionPolicy};
use kettle_common::snapshot::RecoverySnapshot;
use kettle_common::state::SequenceStatus;
use kettle_control_unit::safety::recovery::restore_on_boot;
use kettle_control_unit::{Command, CommandOutcome};
use kettle_hal::MemoryStore;

use super::{recipe, step, Plant};

// ── Helpers ──

fn hop_recipe() -> kettle_common::recipe::Recipe {
    let mut mash = step("Mash", 152.0, 20.0, CompletionPolicy::ManualAdvance);
    mash.additions = vec![
        Addition::new("early", "Early Hops", 18.0),
        Addition::new("late", "Late Hops", 5.0),
    ];
    recipe(vec![mash])
}

// ── Tests ──

#[test]
fn test_recipe_run_resumes_after_restart() {
    let store = Arc::new(MemoryStore::with_recipes([hop_recipe()]));

    let saved = {
        let mut p = Plant::with_store(store.clone());
        p.kettle.set_virtual_temp(Some(152.0));
        p.apply(Command::LoadRecipe(hop_recipe()));
        p.apply(Command::Start);
        p.run_for(5.5);
        p.run_for(121.0);
        assert_eq!(p.handle().with(|e| e.status_text()), "ALERT: Early Hops");
        p.apply(Command::Resume);
        p.run_for(100.0);

        let Some(RecoverySnapshot::Recipe(progress)) = store.recovery() else {
            panic!("expected a recipe snapshot");
        };
        assert_eq!(progress.recipe_id, "it");
        assert_eq!(progress.fired_additions, vec!["early".to_string()]);
        assert!(progress.temp_reached);
        // Heartbeat every 30 s while timing.
        assert!(progress.elapsed_time > 185.0, "{}", progress.elapsed_time);
        progress
    };

    let mut p = Plant::with_store(store.clone());
    p.kettle.set_virtual_temp(Some(152.0));
    let outcome = p
        .handle()
        .with(|e| restore_on_boot(e, store.as_ref(), true));
    assert_eq!(outcome, Some(CommandOutcome::Applied));

    let (status, reached, early, late) = p.handle().with(|e| {
        let additions = &e.current_step().unwrap().additions;
        (
            e.status(),
            e.temp_reached(),
            additions[0].triggered,
            additions[1].triggered,
        )
    });
    assert_eq!(status, SequenceStatus::Running);
    assert!(reached);
    assert!(early);
    assert!(!late);

    p.run_for(10.0);
    let elapsed = p.handle().with(|e| e.step_run().unwrap().elapsed);
    assert!(
        (elapsed - saved.elapsed_time - 10.0).abs() < 0.2,
        "{elapsed} vs {}",
        saved.elapsed_time
    );
}

#[test]
fn test_manual_session_resumes_with_remaining_time() {
    let store = Arc::new(MemoryStore::new());
    {
        let mut p = Plant::with_store(store.clone());
        p.kettle.set_virtual_temp(Some(150.0));
        p.apply(Command::EnterManual);
        p.apply(Command::SetManualTimerDuration(10.0));
        p.apply(Command::StartManual);
        p.run_for(5.5);
        p.run_for(65.0);
    }
    let Some(RecoverySnapshot::Manual(progress)) = store.recovery() else {
        panic!("expected a manual snapshot");
    };
    assert!(progress.elapsed_time >= 30.0);

    let mut p = Plant::with_store(store.clone());
    p.kettle.set_virtual_temp(Some(150.0));
    p.handle()
        .with(|e| restore_on_boot(e, store.as_ref(), true));
    let (status, running, remaining) =
        p.handle().with(|e| (e.status(), e.manual().running, e.manual().remaining));
    assert_eq!(status, SequenceStatus::Manual);
    assert!(running);
    assert!((remaining - (600.0 - progress.elapsed_time)).abs() < 1e-6);

    p.run_for(5.0);
    let after = p.handle().with(|e| e.manual().remaining);
    assert!((remaining - after - 5.0).abs() < 0.3, "{after}");
}

#[test]
fn test_stop_clears_the_snapshot() {
    let store = Arc::new(MemoryStore::with_recipes([hop_recipe()]));
    let mut p = Plant::with_store(store.clone());
    p.kettle.set_virtual_temp(Some(152.0));
    p.apply(Command::LoadRecipe(hop_recipe()));
    p.apply(Command::Start);
    p.run_for(10.0);
    assert!(store.recovery().is_some());

    p.apply(Command::Stop);
    assert!(store.recovery().is_none());

    let mut fresh = Plant::with_store(store.clone());
    let outcome = fresh
        .handle()
        .with(|e| restore_on_boot(e, store.as_ref(), true));
    assert_eq!(outcome, None);
    fresh.run_for(1.0);
    assert_eq!(fresh.handle().with(|e| e.status()), SequenceStatus::Idle);
}
