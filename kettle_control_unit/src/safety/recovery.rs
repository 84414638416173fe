//! Crash recovery.
//!
//! The engine writes a [`RecoverySnapshot`] at every transition boundary
//! (start, step entry, latch, addition, pause, resume) and every
//! [`RECOVERY_HEARTBEAT_S`](kettle_common::consts::RECOVERY_HEARTBEAT_S)
//! while a timer is running. The snapshot is cleared on completion and on
//! an explicit stop.
//!
//! ## Restore rules
//!
//! | Mode     | Requires                     | Result                              |
//! |----------|------------------------------|-------------------------------------|
//! | recipe   | same recipe id loaded        | Running at the saved step; timer    |
//! |          |                              | re-anchored if it had latched       |
//! | manual   | nothing                      | Manual with target, caps and timer  |
//! |          |                              | remaining = duration − elapsed      |
//! | delayed  | nothing                      | DelayedWait; fires on the next tick |
//! |          |                              | if the fire time has passed         |

use kettle_common::snapshot::{ManualProgress, RecipeProgress, RecoverySnapshot, SNAPSHOT_VERSION};
use kettle_common::state::SequenceStatus;
use kettle_common::store::RecipeSource;
use tracing::{info, warn};

use crate::command::CommandOutcome;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::state::delayed::DelayedStart;
use crate::state::sequence::{SequenceEvent, TransitionResult};

impl Engine {
    /// Snapshot of the current run, or `None` when nothing is running.
    pub fn snapshot(&self) -> Option<RecoverySnapshot> {
        let saved_at = self.clock.wall();
        match self.status() {
            SequenceStatus::DelayedWait => self
                .delayed
                .as_ref()
                .map(|d| RecoverySnapshot::Delayed(d.progress(saved_at))),
            SequenceStatus::Manual => {
                let m = &self.manual;
                Some(RecoverySnapshot::Manual(ManualProgress {
                    version: SNAPSHOT_VERSION,
                    saved_at: Some(saved_at),
                    target_temp: m.target_temp,
                    ramp_watts: m.ramp_watts,
                    hold_watts: m.hold_watts,
                    volume: m.volume,
                    heater_enabled: m.heater_enabled,
                    timer_duration: m.timer_duration,
                    temp_reached: m.latch.is_reached(),
                    elapsed_time: m.elapsed(),
                }))
            }
            status if status.is_recipe_active() => {
                let recipe = self.recipe.as_ref()?;
                let index = self.step_index?;
                let run = self.run.as_ref()?;
                let fired_additions = recipe
                    .steps
                    .get(index)
                    .map(|s| {
                        s.additions
                            .iter()
                            .filter(|a| a.triggered)
                            .map(|a| a.id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                Some(RecoverySnapshot::Recipe(RecipeProgress {
                    version: SNAPSHOT_VERSION,
                    saved_at: Some(saved_at),
                    status,
                    recipe_id: recipe.id.clone(),
                    step_index: index,
                    elapsed_time: run.elapsed,
                    temp_reached: run.is_reached(),
                    global_elapsed: self.global_elapsed(),
                    fired_additions,
                }))
            }
            _ => None,
        }
    }

    /// Persist the current snapshot. Failures are logged, never fatal.
    pub(crate) fn save_snapshot(&mut self) {
        self.last_heartbeat = self.clock.monotonic();
        let Some(snapshot) = self.snapshot() else {
            return;
        };
        if let Err(e) = self.store.save_recovery_state(&snapshot) {
            warn!(error = %e, "Failed to save recovery snapshot");
        }
    }

    pub(crate) fn clear_snapshot(&self) {
        if let Err(e) = self.store.clear_recovery_state() {
            warn!(error = %e, "Failed to clear recovery snapshot");
        }
    }

    /// Resume from a snapshot.
    pub fn restore(&mut self, snapshot: RecoverySnapshot) -> CommandOutcome {
        match snapshot {
            RecoverySnapshot::Recipe(p) => self.restore_recipe(&p),
            RecoverySnapshot::Manual(p) => self.restore_manual(&p),
            RecoverySnapshot::Delayed(p) => {
                self.stop_all_activity();
                let now = self.clock.monotonic();
                let plan = DelayedStart::from_progress(now, &p);
                let target = plan.target_temp.min(self.config.process.max_target_temp);
                self.arm_delayed_session(target, plan.volume);
                info!(fire_at = %plan.fire_at, ready_at = %plan.ready_at, "Delayed start restored");
                self.delayed = Some(plan);
                self.machine.handle_event(SequenceEvent::ScheduleDelay);
                self.save_snapshot();
                CommandOutcome::Applied
            }
        }
    }

    fn restore_recipe(&mut self, p: &RecipeProgress) -> CommandOutcome {
        let Some(recipe) = self.recipe.as_ref() else {
            return EngineError::NoRecipeLoaded.into();
        };
        if recipe.id != p.recipe_id {
            warn!(
                saved = %p.recipe_id,
                loaded = %recipe.id,
                "Recovery snapshot is for a different recipe"
            );
            return CommandOutcome::Rejected("snapshot does not match the loaded recipe");
        }
        if p.step_index >= recipe.len() {
            return EngineError::StepOutOfRange {
                index: p.step_index,
                len: recipe.len(),
            }
            .into();
        }

        let now = self.clock.monotonic();
        if let TransitionResult::Rejected(reason) = self.machine.handle_event(SequenceEvent::Restore)
        {
            return CommandOutcome::Rejected(reason);
        }
        self.global.reset();
        if let Err(e) = self.init_step(p.step_index, now) {
            self.machine.handle_event(SequenceEvent::Stop);
            return e.into();
        }
        if p.temp_reached {
            if let Some(run) = self.run.as_mut() {
                run.restore_elapsed(now, p.elapsed_time.max(0.0));
            }
        }
        self.global.restore(now, p.global_elapsed.max(0.0));
        if let Some(step) = self
            .recipe
            .as_mut()
            .and_then(|r| r.steps.get_mut(p.step_index))
        {
            for a in &mut step.additions {
                a.triggered = p.fired_additions.contains(&a.id);
            }
        }

        info!(
            step = p.step_index + 1,
            elapsed = p.elapsed_time,
            reached = p.temp_reached,
            "Recipe restored from recovery snapshot"
        );
        self.save_snapshot();
        CommandOutcome::Applied
    }

    fn restore_manual(&mut self, p: &ManualProgress) -> CommandOutcome {
        self.enter_manual();
        let m = &mut self.manual;
        m.target_temp = p.target_temp.min(self.config.process.max_target_temp);
        m.ramp_watts = p.ramp_watts;
        m.hold_watts = p.hold_watts;
        m.volume = p.volume;
        m.timer_duration = p.timer_duration.max(0.0);
        m.remaining = (p.timer_duration - p.elapsed_time).max(0.0);
        if p.temp_reached {
            m.latch.force();
        }
        m.heater_enabled = p.heater_enabled;
        m.running = p.heater_enabled || p.temp_reached;

        info!(
            target = m.target_temp,
            remaining_s = m.remaining,
            heater = m.heater_enabled,
            "Manual session restored from recovery snapshot"
        );
        self.save_snapshot();
        CommandOutcome::Applied
    }
}

/// Boot sequence: read the snapshot (when `auto_resume`), load the recipe
/// it names or else the last one used, then restore.
///
/// The snapshot is read before any recipe is loaded, since loading a
/// recipe performs a full stop that clears it.
pub fn restore_on_boot(
    engine: &mut Engine,
    recipes: &dyn RecipeSource,
    auto_resume: bool,
) -> Option<CommandOutcome> {
    let snapshot = if auto_resume {
        match engine.store.get_recovery_state() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Recovery snapshot unreadable, starting fresh");
                None
            }
        }
    } else {
        None
    };

    let wanted = match &snapshot {
        Some(RecoverySnapshot::Recipe(p)) => Some(p.recipe_id.clone()),
        _ => engine.store.last_recipe_id().unwrap_or_else(|e| {
            warn!(error = %e, "Last recipe id unreadable");
            None
        }),
    };
    if let Some(id) = wanted {
        match recipes.load_recipe(&id) {
            Ok(recipe) => {
                engine.load_recipe(recipe);
            }
            Err(e) => warn!(recipe = %id, error = %e, "Could not load recipe"),
        }
    }

    let snapshot = snapshot?;
    info!(mode = ?snapshot.mode(), saved_at = ?snapshot.saved_at(), "Resuming from recovery snapshot");
    let outcome = engine.restore(snapshot);
    if let CommandOutcome::Rejected(reason) = outcome {
        warn!(reason, "Recovery snapshot not restored");
    }
    Some(outcome)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kettle_common::clock::ManualClock;
    use kettle_common::config::KettleConfig;
    use kettle_common::recipe::Recipe;
    use kettle_common::store::Persistence;
    use kettle_hal::{LogAlertSink, MemoryStore};
    use std::sync::Arc;

    fn engine_with(store: Arc<MemoryStore>) -> (ManualClock, Engine) {
        let clock = ManualClock::new(500.0, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
        let engine = Engine::new(
            KettleConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(LogAlertSink::new()),
            store,
        );
        (clock, engine)
    }

    #[test]
    fn idle_engine_has_no_snapshot() {
        let (_, engine) = engine_with(Arc::new(MemoryStore::new()));
        assert_eq!(engine.snapshot(), None);
    }

    #[test]
    fn manual_restore_resumes_countdown() {
        let (_, mut engine) = engine_with(Arc::new(MemoryStore::new()));
        let outcome = engine.restore(RecoverySnapshot::Manual(ManualProgress {
            target_temp: 152.0,
            timer_duration: 3600.0,
            elapsed_time: 300.0,
            temp_reached: true,
            ..ManualProgress::default()
        }));
        assert!(outcome.is_applied());
        assert_eq!(engine.status(), SequenceStatus::Manual);
        assert!(engine.manual().running);
        assert_eq!(engine.manual().remaining, 3300.0);
    }

    #[test]
    fn recipe_restore_rejects_other_recipe() {
        let (_, mut engine) = engine_with(Arc::new(MemoryStore::new()));
        engine.load_recipe(Recipe::default_recipe());
        let outcome = engine.restore(RecoverySnapshot::Recipe(RecipeProgress {
            recipe_id: "something-else".into(),
            ..RecipeProgress::default()
        }));
        assert!(!outcome.is_applied());
        assert_eq!(engine.status(), SequenceStatus::Idle);
    }

    #[test]
    fn boot_loads_snapshot_recipe_from_library() {
        let store = Arc::new(MemoryStore::with_recipes([Recipe::default_recipe()]));
        store
            .save_recovery_state(&RecoverySnapshot::Recipe(RecipeProgress {
                recipe_id: "default".into(),
                step_index: 1,
                elapsed_time: 120.0,
                temp_reached: true,
                global_elapsed: 900.0,
                ..RecipeProgress::default()
            }))
            .unwrap();
        let (_, mut engine) = engine_with(store.clone());

        let outcome = restore_on_boot(&mut engine, store.as_ref(), true);
        assert_eq!(outcome, Some(CommandOutcome::Applied));
        assert_eq!(engine.status(), SequenceStatus::Running);
        assert_eq!(engine.step_index(), Some(1));
        assert!(engine.temp_reached());
        assert_eq!(engine.step_run().unwrap().elapsed, 120.0);
        assert_eq!(engine.global_elapsed(), 900.0);
    }

    #[test]
    fn boot_without_auto_resume_only_loads_last_recipe() {
        let store = Arc::new(MemoryStore::with_recipes([Recipe::default_recipe()]));
        store.save_last_recipe_id("default").unwrap();
        let (_, mut engine) = engine_with(store.clone());
        assert_eq!(restore_on_boot(&mut engine, store.as_ref(), false), None);
        assert_eq!(engine.recipe().map(|r| r.id.as_str()), Some("default"));
        assert_eq!(engine.status(), SequenceStatus::Idle);
    }
}
