//! # Process-control engine
//!
//! Single owner of all run state. Two entry points mutate it, and both
//! are called under the [`KettleHandle`](crate::handle::KettleHandle) lock:
//!
//! - [`Engine::apply`]: one operator [`Command`]
//! - [`Engine::tick`]: one control-loop period with a fresh reading
//!
//! ## Tick pipeline
//!
//! ```text
//!   reading ──► energy ──► fail-safe ──► hard stop ──► nag
//!                 │           │ none        │ engaged
//!                 │           ▼             ▼
//!                 │         OFF           OFF
//!                 ▼
//!        ┌─────────────── status ───────────────┐
//!        │ DelayedWait  Running/Paused/Waiting  │ Manual     Idle/Completed
//!        │ refresh/fire latch→power→timer       │ latch→     0 W
//!        │ 0 W                                  │ countdown
//!        └──────────────────┬───────────────────┘
//!                           ▼
//!                allocate(watts) → PWM phase → RelayMask
//! ```
//!
//! The engine never talks to hardware. It returns the relay mask and the
//! loop writes it, so a stuck actuator cannot stall the engine lock.
//! Storage reads happen only at construction; writes go to the
//! [`Persistence`] handed in, which in production is a
//! `WriteBehindStore` that never blocks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kettle_common::clock::Clock;
use kettle_common::config::{KettleConfig, ManualDefaults};
use kettle_common::consts::{DELAYED_TIMER_MIN, RECOVERY_HEARTBEAT_S};
use kettle_common::hal::{AlertSink, RelayMask};
use kettle_common::recipe::{CompletionPolicy, Recipe, Step};
use kettle_common::state::{PendingAlert, RunOrigin, SequenceStatus};
use kettle_common::store::Persistence;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandOutcome};
use crate::control::allocator::{allocate, Allocation};
use crate::control::pid::{Pid, PidGains};
use crate::control::ramp::RampCalibration;
use crate::energy::EnergyMeter;
use crate::error::EngineError;
use crate::safety::hard_stop::HardStop;
use crate::state::delayed::DelayedStart;
use crate::state::manual::{ManualEvent, ManualSession};
use crate::state::recipe_run::{GlobalTimer, StepRun, TimeEvent};
use crate::state::sequence::{SequenceEvent, SequenceMachine, TransitionResult};

// ─── Output ─────────────────────────────────────────────────────────

/// Power decision of the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerOutput {
    /// Requested wattage.
    pub watts: f64,
    pub allocation: Allocation,
    /// Relays commanded this tick, PWM phase applied.
    pub mask: RelayMask,
}

impl PowerOutput {
    pub fn off() -> Self {
        Self::default()
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

pub struct Engine {
    pub(crate) config: KettleConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) store: Arc<dyn Persistence>,
    pub(crate) ramp_cal: RampCalibration,

    pub(crate) machine: SequenceMachine,
    pub(crate) recipe: Option<Recipe>,
    /// `None` after a stop; `Some(0)` for a freshly loaded recipe.
    pub(crate) step_index: Option<usize>,
    pub(crate) run: Option<StepRun>,
    pub(crate) global: GlobalTimer,
    pub(crate) pending: Option<PendingAlert>,

    pub(crate) manual: ManualSession,
    /// Settings a fresh manual session opens with, last saved value.
    manual_defaults: ManualDefaults,
    pub(crate) delayed: Option<DelayedStart>,
    pub(crate) hard_stop: HardStop,

    pub(crate) pid: Pid,
    pub(crate) energy: EnergyMeter,
    pub(crate) current_temp: Option<f64>,
    pub(crate) output: PowerOutput,

    /// Monotonic time of the last alert sound.
    last_alert: f64,
    /// Monotonic time of the last recovery write.
    pub(crate) last_heartbeat: f64,
}

impl Engine {
    pub fn new(
        config: KettleConfig,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        let manual_defaults = load_manual_defaults(store.as_ref(), &config.manual);
        let manual = ManualSession::from_defaults(&manual_defaults, &config.process);
        let pid = Pid::new(PidGains::from(&config.pid));
        let ramp_cal = RampCalibration::from(&config.calibration);
        let now = clock.monotonic();

        let mut energy = EnergyMeter::new();
        energy.reset(now);

        Self {
            config,
            clock,
            alerts,
            store,
            ramp_cal,
            machine: SequenceMachine::new(),
            recipe: None,
            step_index: None,
            run: None,
            global: GlobalTimer::default(),
            pending: None,
            manual,
            manual_defaults,
            delayed: None,
            hard_stop: HardStop::new(),
            pid,
            energy,
            current_temp: None,
            output: PowerOutput::off(),
            last_alert: now,
            last_heartbeat: now,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    #[inline]
    pub const fn status(&self) -> SequenceStatus {
        self.machine.status()
    }

    pub fn config(&self) -> &KettleConfig {
        &self.config
    }

    pub fn recipe(&self) -> Option<&Recipe> {
        self.recipe.as_ref()
    }

    #[inline]
    pub const fn step_index(&self) -> Option<usize> {
        self.step_index
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.recipe.as_ref()?.steps.get(self.step_index?)
    }

    pub fn step_run(&self) -> Option<&StepRun> {
        self.run.as_ref()
    }

    pub fn manual(&self) -> &ManualSession {
        &self.manual
    }

    pub fn delayed(&self) -> Option<&DelayedStart> {
        self.delayed.as_ref()
    }

    pub fn pending_alert(&self) -> Option<&PendingAlert> {
        self.pending.as_ref()
    }

    #[inline]
    pub const fn is_hard_stopped(&self) -> bool {
        self.hard_stop.is_engaged()
    }

    /// Last usable reading; `None` while the sensor is failed.
    #[inline]
    pub const fn current_temp(&self) -> Option<f64> {
        self.current_temp
    }

    #[inline]
    pub const fn output(&self) -> &PowerOutput {
        &self.output
    }

    pub fn applied_watts(&self) -> f64 {
        self.output.mask.watts(&self.config.heater.relay_watts)
    }

    pub fn energy(&self) -> &EnergyMeter {
        &self.energy
    }

    pub fn energy_cost(&self) -> f64 {
        self.energy.cost(self.config.heater.cost_per_kwh)
    }

    /// Whether the active step or manual session has latched.
    pub fn temp_reached(&self) -> bool {
        match self.status() {
            SequenceStatus::Manual => self.manual.latch.is_reached(),
            s if s.is_recipe_active() => self.run.as_ref().is_some_and(StepRun::is_reached),
            _ => false,
        }
    }

    /// Target the engine is currently working toward [°F].
    pub fn target_temp(&self) -> f64 {
        match self.status() {
            SequenceStatus::Manual => self.manual.target_temp,
            SequenceStatus::DelayedWait => self.delayed.as_ref().map_or(0.0, |d| d.target_temp),
            s if s.is_recipe_active() => self.run.as_ref().map_or(0.0, |r| r.target),
            _ => 0.0,
        }
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Apply one operator command.
    pub fn apply(&mut self, cmd: Command) -> CommandOutcome {
        let name = cmd.name();
        let outcome = match cmd {
            Command::LoadRecipe(recipe) => self.load_recipe(recipe),
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Advance => self.advance(),
            Command::Stop => self.stop(),
            Command::Reset => self.reset(),
            Command::HardStop => self.hard_stop(),
            Command::EnterManual => self.enter_manual(),
            Command::StartManual => self.start_manual(),
            Command::PauseManual => self.pause_manual(),
            Command::SetManualTarget(t) => self.set_manual_target(t),
            Command::SetManualRampPower(w) => self.set_manual_ramp_power(w),
            Command::SetManualHoldPower(w) => self.set_manual_hold_power(w),
            Command::SetManualPower(w) => self.set_manual_power(w),
            Command::SetManualVolume(v) => self.set_manual_volume(v),
            Command::SetManualTimerDuration(m) => self.set_manual_timer_duration(m),
            Command::ScheduleDelayed {
                target_temp,
                volume,
                ready_at,
                origin,
            } => self.schedule_delayed(target_temp, volume, ready_at, origin),
            Command::CancelDelayed => self.cancel_delayed(),
            Command::Restore(snapshot) => self.restore(snapshot),
            Command::ResetEnergy => self.reset_energy(),
        };
        match outcome {
            CommandOutcome::Applied => debug!(command = name, "Command applied"),
            CommandOutcome::Rejected(reason) => info!(command = name, reason, "Command rejected"),
        }
        outcome
    }

    /// Full stop, then make `recipe` current at step 0.
    pub fn load_recipe(&mut self, mut recipe: Recipe) -> CommandOutcome {
        if recipe.is_empty() {
            return CommandOutcome::Rejected("recipe has no steps");
        }
        self.stop_all_activity();
        recipe.reset_additions();
        info!(recipe = %recipe.name, steps = recipe.len(), "Recipe loaded");
        if let Err(e) = self.store.save_last_recipe_id(&recipe.id) {
            warn!(error = %e, "Failed to remember last recipe");
        }
        self.recipe = Some(recipe);
        self.step_index = Some(0);
        CommandOutcome::Applied
    }

    /// Begin the loaded recipe at step 0. Also clears a hard stop.
    pub fn start(&mut self) -> CommandOutcome {
        if self.recipe.is_none() {
            return EngineError::NoRecipeLoaded.into();
        }
        let cleared = self.hard_stop.clear();
        let now = self.clock.monotonic();

        match self.machine.handle_event(SequenceEvent::Start) {
            TransitionResult::Ok(_) => {
                self.energy.reset(now);
                self.global.reset();
                if let Err(e) = self.init_step(0, now) {
                    self.machine.handle_event(SequenceEvent::Stop);
                    return e.into();
                }
                if let Some(r) = &self.recipe {
                    info!(recipe = %r.name, "Recipe started");
                }
                self.save_snapshot();
                CommandOutcome::Applied
            }
            TransitionResult::Rejected(_) if cleared => {
                info!("Hard stop cleared");
                CommandOutcome::Applied
            }
            TransitionResult::Rejected(reason) => CommandOutcome::Rejected(reason),
        }
    }

    pub fn pause(&mut self) -> CommandOutcome {
        let now = self.clock.monotonic();
        let result = self.machine.handle_event(SequenceEvent::Pause);
        if let TransitionResult::Ok(_) = result {
            if let Some(run) = self.run.as_mut() {
                run.begin_pause(now);
            }
            info!("Sequence paused");
            self.save_snapshot();
        }
        result.into()
    }

    /// Resume a pause or acknowledge an alert. Also clears a hard stop.
    pub fn resume(&mut self) -> CommandOutcome {
        let cleared = self.hard_stop.clear();
        let now = self.clock.monotonic();
        if matches!(
            self.status(),
            SequenceStatus::Paused | SequenceStatus::WaitingForUser
        ) {
            self.resume_at(now);
            info!("Sequence resumed");
            CommandOutcome::Applied
        } else if cleared {
            info!("Hard stop cleared");
            CommandOutcome::Applied
        } else {
            CommandOutcome::Rejected("nothing to resume")
        }
    }

    /// Skip to the next step; the last step completes the recipe.
    pub fn advance(&mut self) -> CommandOutcome {
        if self.recipe.is_none() {
            return EngineError::NoRecipeLoaded.into();
        }
        if !self.status().is_recipe_active() {
            return CommandOutcome::Rejected("no step in progress");
        }
        let now = self.clock.monotonic();
        self.advance_step(now);
        CommandOutcome::Applied
    }

    /// Full stop. The recipe stays loaded. Also clears a hard stop.
    pub fn stop(&mut self) -> CommandOutcome {
        self.stop_all_activity();
        if self.hard_stop.clear() {
            info!("Hard stop cleared");
        }
        info!("Stopped");
        CommandOutcome::Applied
    }

    /// Full stop and rewind to step 0 with all additions re-armed. Also
    /// clears a hard stop.
    pub fn reset(&mut self) -> CommandOutcome {
        self.stop_all_activity();
        if self.hard_stop.clear() {
            info!("Hard stop cleared");
        }
        if let Some(recipe) = self.recipe.as_mut() {
            recipe.reset_additions();
            self.step_index = Some(0);
        }
        info!("Sequence reset");
        CommandOutcome::Applied
    }

    /// Latched override: relays off until an explicit start, resume, stop
    /// or reset. Every other command leaves it engaged.
    pub fn hard_stop(&mut self) -> CommandOutcome {
        let now = self.clock.monotonic();
        self.hard_stop.engage(now);
        self.manual.running = false;
        self.manual.heater_enabled = false;
        if let TransitionResult::Ok(_) = self.machine.handle_event(SequenceEvent::HardStop) {
            if let Some(run) = self.run.as_mut() {
                run.begin_pause(now);
            }
            self.save_snapshot();
        }
        warn!("Hard stop engaged, all relays off");
        CommandOutcome::Applied
    }

    /// Full stop, then open a manual session from the saved defaults.
    pub fn enter_manual(&mut self) -> CommandOutcome {
        self.stop_all_activity();
        self.machine.handle_event(SequenceEvent::EnterManual);
        self.manual = ManualSession::from_defaults(&self.manual_defaults, &self.config.process);
        info!(target = self.manual.target_temp, "Manual mode");
        self.save_snapshot();
        CommandOutcome::Applied
    }

    /// Enable heat and arm the manual timer. Also clears a hard stop.
    pub fn start_manual(&mut self) -> CommandOutcome {
        self.hard_stop.clear();
        if self.status() != SequenceStatus::Manual {
            self.enter_manual();
        }
        let now = self.clock.monotonic();
        self.manual.start(now, self.current_temp.unwrap_or(0.0));
        if !self.manual.latch.is_reached() {
            self.pid.reset();
        }
        info!(
            target = self.manual.target_temp,
            timer_s = self.manual.remaining,
            "Manual heating started"
        );
        self.save_snapshot();
        CommandOutcome::Applied
    }

    /// Before the latch: full manual reset. After it: stop the countdown
    /// and keep holding heat.
    pub fn pause_manual(&mut self) -> CommandOutcome {
        if self.status() != SequenceStatus::Manual {
            return CommandOutcome::Rejected("not in manual mode");
        }
        if self.manual.latch.is_reached() {
            self.manual.running = false;
            info!("Manual timer paused, holding temperature");
            self.save_snapshot();
        } else {
            self.enter_manual();
        }
        CommandOutcome::Applied
    }

    pub fn set_manual_target(&mut self, temp: f64) -> CommandOutcome {
        if !temp.is_finite() || temp < 0.0 {
            return CommandOutcome::Rejected("invalid temperature");
        }
        self.manual.target_temp = temp.min(self.config.process.max_target_temp);
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    pub fn set_manual_ramp_power(&mut self, watts: f64) -> CommandOutcome {
        if !valid_watts(watts) {
            return CommandOutcome::Rejected("invalid power");
        }
        self.manual.ramp_watts = watts;
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    pub fn set_manual_hold_power(&mut self, watts: f64) -> CommandOutcome {
        if !valid_watts(watts) {
            return CommandOutcome::Rejected("invalid power");
        }
        self.manual.hold_watts = watts;
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    pub fn set_manual_power(&mut self, watts: f64) -> CommandOutcome {
        if !valid_watts(watts) {
            return CommandOutcome::Rejected("invalid power");
        }
        self.manual.ramp_watts = watts;
        self.manual.hold_watts = watts;
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    pub fn set_manual_volume(&mut self, volume: f64) -> CommandOutcome {
        if !volume.is_finite() || volume <= 0.0 {
            return CommandOutcome::Rejected("invalid volume");
        }
        self.manual.volume = volume;
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    pub fn set_manual_timer_duration(&mut self, minutes: f64) -> CommandOutcome {
        if !minutes.is_finite() || minutes < 0.0 {
            return CommandOutcome::Rejected("invalid duration");
        }
        self.manual.set_timer_duration(minutes * 60.0);
        self.manual_settings_changed();
        CommandOutcome::Applied
    }

    /// Full stop, then wait until it is time to heat for `ready_at`.
    pub fn schedule_delayed(
        &mut self,
        target_temp: f64,
        volume: f64,
        ready_at: DateTime<Utc>,
        origin: Option<RunOrigin>,
    ) -> CommandOutcome {
        if !target_temp.is_finite() || target_temp <= 0.0 {
            return CommandOutcome::Rejected("invalid temperature");
        }
        if !volume.is_finite() || volume <= 0.0 {
            return CommandOutcome::Rejected("invalid volume");
        }
        let origin = origin.unwrap_or(if self.status() == SequenceStatus::Manual {
            RunOrigin::Manual
        } else {
            RunOrigin::Recipe
        });
        self.stop_all_activity();

        let now = self.clock.monotonic();
        let target = target_temp.min(self.config.process.max_target_temp);
        let start_temp = self
            .current_temp
            .unwrap_or(self.config.calibration.fallback_start_temp);
        self.arm_delayed_session(target, volume);

        let plan = DelayedStart::plan(now, ready_at, target, volume, origin, start_temp, &self.ramp_cal);
        info!(
            fire_at = %plan.fire_at,
            ready_at = %plan.ready_at,
            ?origin,
            "Delayed start scheduled"
        );
        self.delayed = Some(plan);
        self.machine.handle_event(SequenceEvent::ScheduleDelay);
        self.save_snapshot();
        CommandOutcome::Applied
    }

    /// Drop a pending delayed start and return to where it was scheduled.
    pub fn cancel_delayed(&mut self) -> CommandOutcome {
        if self.status() != SequenceStatus::DelayedWait {
            return CommandOutcome::Rejected("no delayed start pending");
        }
        let origin = self.delayed.as_ref().map_or(RunOrigin::Recipe, |d| d.origin);
        info!(?origin, "Delayed start cancelled");
        match origin {
            RunOrigin::Recipe => self.stop(),
            RunOrigin::Manual => self.enter_manual(),
        }
    }

    pub fn reset_energy(&mut self) -> CommandOutcome {
        self.energy.reset(self.clock.monotonic());
        CommandOutcome::Applied
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// One control period. `reading` is the fresh temperature, or `None`
    /// when the sensor has nothing trustworthy.
    ///
    /// Returns the relay mask to write. Any missing or invalid reading and
    /// any error yields an all-off output.
    pub fn tick(&mut self, reading: Option<f64>) -> Result<RelayMask, EngineError> {
        let now = self.clock.monotonic();
        self.energy
            .integrate(now, self.output.mask, &self.config.heater.relay_watts);

        let temp = match reading {
            Some(t) if t.is_finite() => t,
            Some(t) => {
                self.fail_safe();
                return Err(EngineError::NonFiniteReading(t));
            }
            None => {
                self.fail_safe();
                return Ok(RelayMask::empty());
            }
        };
        self.current_temp = Some(temp);

        if self.hard_stop.is_engaged() {
            self.output = PowerOutput::off();
            return Ok(RelayMask::empty());
        }

        self.nag(now);

        let watts = match self.status() {
            SequenceStatus::DelayedWait => {
                self.tick_delayed(now, temp);
                0.0
            }
            SequenceStatus::Running | SequenceStatus::Paused | SequenceStatus::WaitingForUser => {
                match self.tick_recipe(now, temp) {
                    Ok(w) => w,
                    Err(e) => {
                        self.output = PowerOutput::off();
                        return Err(e);
                    }
                }
            }
            SequenceStatus::Manual => self.tick_manual(now, temp),
            SequenceStatus::Idle | SequenceStatus::Completed => 0.0,
        };

        self.heartbeat(now);
        Ok(self.drive(now, watts))
    }

    fn fail_safe(&mut self) {
        self.current_temp = None;
        self.output = PowerOutput::off();
    }

    fn drive(&mut self, now: f64, watts: f64) -> RelayMask {
        let allocation = allocate(watts, &self.config.heater.relay_watts);
        let mask = allocation.mask_at(now, self.config.heater.pwm_cycle_s);
        self.output = PowerOutput {
            watts,
            allocation,
            mask,
        };
        mask
    }

    fn tick_recipe(&mut self, now: f64, temp: f64) -> Result<f64, EngineError> {
        let idx = self.step_index.ok_or(EngineError::NoRecipeLoaded)?;
        let recipe = self.recipe.as_ref().ok_or(EngineError::NoRecipeLoaded)?;
        let step = recipe.steps.get(idx).ok_or(EngineError::StepOutOfRange {
            index: idx,
            len: recipe.len(),
        })?;
        let run = self.run.as_mut().ok_or(EngineError::NoRecipeLoaded)?;
        let process = &self.config.process;
        let paused = self.machine.status() != SequenceStatus::Running;

        let reached_now = if run.target > 0.0 {
            let threshold = run.threshold(process);
            run.latch.update(now, temp, threshold)
        } else if !run.is_reached() {
            run.latch.force();
            true
        } else {
            false
        };

        let mut chime = false;
        if reached_now {
            run.mark_reached(now, paused);
            chime = run.target > 0.0 && run.initial_temp < run.target - process.latch_tolerance;
            info!(step = idx + 1, name = %step.name, temp, "Target reached, step timer running");
        }

        let watts = run.power_request(
            step,
            &mut self.pid,
            now,
            temp,
            process,
            self.config.heater.default_power_watts,
        );

        if reached_now {
            if chime {
                self.chime(now);
            }
            self.save_snapshot();
        }

        if self.status() == SequenceStatus::Running {
            self.process_step_time(now, idx)?;
        }

        Ok(if self.status().is_recipe_active() {
            watts
        } else {
            0.0
        })
    }

    fn process_step_time(&mut self, now: f64, idx: usize) -> Result<(), EngineError> {
        let recipe = self.recipe.as_ref().ok_or(EngineError::NoRecipeLoaded)?;
        let step = recipe.steps.get(idx).ok_or(EngineError::StepOutOfRange {
            index: idx,
            len: recipe.len(),
        })?;
        let run = self.run.as_mut().ok_or(EngineError::NoRecipeLoaded)?;

        match run.evaluate_time(step, now) {
            TimeEvent::Timing => {}
            TimeEvent::AdditionDue(i) => self.fire_addition(now, idx, i),
            TimeEvent::StepDone => self.finish_step(now, idx),
        }
        Ok(())
    }

    fn fire_addition(&mut self, now: f64, idx: usize, addition: usize) {
        let Some(a) = self
            .recipe
            .as_mut()
            .and_then(|r| r.steps.get_mut(idx))
            .and_then(|s| s.additions.get_mut(addition))
        else {
            return;
        };
        a.triggered = true;
        let alert = PendingAlert::Addition {
            step_index: idx,
            addition_id: a.id.clone(),
            name: a.name.clone(),
        };

        if let TransitionResult::Ok(_) = self.machine.handle_event(SequenceEvent::AwaitOperator) {
            info!(step = idx + 1, addition = alert.text(), "Addition due");
            self.pending = Some(alert);
            self.chime(now);
            self.save_snapshot();
        }
    }

    fn finish_step(&mut self, now: f64, idx: usize) {
        let Some(step) = self.recipe.as_ref().and_then(|r| r.steps.get(idx)) else {
            return;
        };
        let timed = step.duration_min > 0.0;
        let policy = step.policy;
        let step_name = step.name.clone();

        if timed {
            self.chime(now);
        }
        match policy {
            CompletionPolicy::AutoAdvance => self.advance_step(now),
            CompletionPolicy::ManualAdvance | CompletionPolicy::EndProgram => {
                if let TransitionResult::Ok(_) =
                    self.machine.handle_event(SequenceEvent::AwaitOperator)
                {
                    if let Some(run) = self.run.as_mut() {
                        run.begin_pause(now);
                    }
                    info!(step = idx + 1, name = %step_name, "Step complete, waiting for operator");
                    self.pending = Some(PendingAlert::StepComplete {
                        step_index: idx,
                        step_name,
                    });
                    self.save_snapshot();
                }
            }
        }
    }

    fn tick_manual(&mut self, now: f64, temp: f64) -> f64 {
        match self.manual.tick(now, temp, &self.config.process) {
            ManualEvent::Reached => {
                info!(temp, target = self.manual.target_temp, "Manual target reached");
                if self.manual.initial_temp
                    < self.manual.target_temp - self.config.process.latch_tolerance
                {
                    self.chime(now);
                }
                self.save_snapshot();
            }
            ManualEvent::TimerExpired => {
                info!("Manual timer finished");
                self.chime(now);
                self.enter_manual();
                return 0.0;
            }
            ManualEvent::None => {}
        }
        self.manual
            .power_request(&mut self.pid, now, temp, &self.config.process)
    }

    fn tick_delayed(&mut self, now: f64, temp: f64) {
        let wall = self.clock.wall();
        let Some(plan) = self.delayed.as_mut() else {
            warn!("Delayed wait without a plan, stopping");
            self.stop_all_activity();
            return;
        };
        if plan.refresh(now, temp, &self.ramp_cal) {
            debug!(fire_at = %plan.fire_at, temp, "Delayed start re-estimated");
        }
        if plan.is_due(wall) {
            let origin = plan.origin;
            self.fire_delayed(now, origin);
        }
    }

    fn fire_delayed(&mut self, now: f64, origin: RunOrigin) {
        info!(?origin, "Delayed start firing");
        self.delayed = None;
        self.energy.reset(now);

        if origin == RunOrigin::Recipe && self.recipe.is_some() {
            self.machine.handle_event(SequenceEvent::Stop);
            if self.start().is_applied() {
                return;
            }
        }
        // Keep the session armed at schedule time.
        self.machine.handle_event(SequenceEvent::EnterManual);
        self.manual.latch.reset();
        self.manual.remaining = self.manual.timer_duration;
        self.start_manual();
    }

    fn nag(&mut self, now: f64) {
        let every = self.config.process.alert_repeat_s;
        if self.status() == SequenceStatus::WaitingForUser
            && every > 0.0
            && now - self.last_alert > every
        {
            self.chime(now);
        }
    }

    fn heartbeat(&mut self, now: f64) {
        let timing = match self.status() {
            SequenceStatus::Running => self.run.as_ref().is_some_and(StepRun::is_reached),
            SequenceStatus::Manual => self.manual.running && self.manual.latch.is_reached(),
            _ => false,
        };
        if timing && now - self.last_heartbeat >= RECOVERY_HEARTBEAT_S {
            self.save_snapshot();
        }
    }

    fn chime(&mut self, now: f64) {
        self.alerts.play_alert();
        self.last_alert = now;
    }

    // ─── Internals ──────────────────────────────────────────────────

    /// Enter step `idx`: fresh timer and latch, additions re-armed.
    pub(crate) fn init_step(&mut self, idx: usize, now: f64) -> Result<(), EngineError> {
        let recipe = self.recipe.as_mut().ok_or(EngineError::NoRecipeLoaded)?;
        let len = recipe.len();
        let step = recipe
            .steps
            .get_mut(idx)
            .ok_or(EngineError::StepOutOfRange { index: idx, len })?;
        step.reset_additions();

        let run = StepRun::new(step, self.current_temp.unwrap_or(0.0), &self.config.process);
        info!(step = idx + 1, name = %step.name, target = run.target, "Step started");

        self.run = Some(run);
        self.step_index = Some(idx);
        self.global.start_if_unset(now);
        self.pending = None;
        self.pid.reset();
        Ok(())
    }

    fn advance_step(&mut self, now: f64) {
        if matches!(
            self.status(),
            SequenceStatus::Paused | SequenceStatus::WaitingForUser
        ) {
            self.resume_at(now);
        }
        let Some((len, ends)) = self.recipe.as_ref().map(|r| {
            let ends = self
                .step_index
                .and_then(|i| r.steps.get(i))
                .is_some_and(|s| s.policy == CompletionPolicy::EndProgram);
            (r.len(), ends)
        }) else {
            return;
        };
        let next = self.step_index.map_or(0, |i| i + 1);

        if ends || next >= len {
            self.complete();
            return;
        }
        self.machine.handle_event(SequenceEvent::Advance);
        match self.init_step(next, now) {
            Ok(()) => self.save_snapshot(),
            Err(e) => {
                warn!(error = %e, "Cannot enter next step, completing");
                self.complete();
            }
        }
    }

    fn complete(&mut self) {
        self.machine.handle_event(SequenceEvent::Finish);
        self.pending = None;
        self.clear_snapshot();
        info!(
            kwh = self.energy.kwh(),
            cost = self.energy_cost(),
            "Recipe complete"
        );
    }

    fn resume_at(&mut self, now: f64) {
        if let TransitionResult::Ok(_) = self.machine.handle_event(SequenceEvent::Resume) {
            if let Some(run) = self.run.as_mut() {
                let paused = run.end_pause(now);
                self.global.add_pause(paused);
            }
            self.pending = None;
            self.save_snapshot();
        }
    }

    /// Idle with nothing armed: no step, no manual heat, no delayed start.
    /// The recipe stays loaded and a hard stop stays as it was.
    pub(crate) fn stop_all_activity(&mut self) {
        self.machine.handle_event(SequenceEvent::Stop);
        self.manual.running = false;
        self.manual.heater_enabled = false;
        self.step_index = None;
        self.run = None;
        self.pending = None;
        self.delayed = None;
        self.clear_snapshot();
    }

    pub(crate) fn arm_delayed_session(&mut self, target: f64, volume: f64) {
        self.manual.target_temp = target;
        self.manual.volume = volume;
        self.manual.latch.reset();
        self.manual.set_timer_duration(DELAYED_TIMER_MIN * 60.0);
    }

    fn manual_settings_changed(&mut self) {
        self.manual_defaults = self.manual.defaults();
        if let Err(e) = self.store.save_manual_defaults(&self.manual_defaults) {
            warn!(error = %e, "Failed to save manual defaults");
        }
        if self.status() == SequenceStatus::Manual {
            self.save_snapshot();
        }
    }
}

fn load_manual_defaults(store: &dyn Persistence, fallback: &ManualDefaults) -> ManualDefaults {
    match store.load_manual_defaults() {
        Ok(Some(d)) => d,
        Ok(None) => fallback.clone(),
        Err(e) => {
            warn!(error = %e, "Manual defaults unreadable, using configuration");
            fallback.clone()
        }
    }
}

#[inline]
fn valid_watts(watts: f64) -> bool {
    watts.is_finite() && watts >= 0.0
}

// ─── Tests ──────────────────────────────────────────────────────────
