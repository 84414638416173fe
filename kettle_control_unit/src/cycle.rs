//! Fixed-period control loop: read → tick → write.
//!
//! ## RT Setup
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` to lock all pages.
//! 2. `sched_setaffinity` to pin the loop to one core.
//! 3. `sched_setscheduler(SCHED_FIFO, prio)`.
//!
//! All three are no-ops without the `rt` feature.
//!
//! ## Cycle Loop
//! With `rt`, absolute-time sleep on `CLOCK_MONOTONIC` for drift-free
//! pacing. Without it, `thread::sleep` for whatever is left of the period.
//! An overrun is counted, never fatal: the kettle tolerates a late tick.
//!
//! ## Cycle Body
//!
//! ```text
//!   sensor ──► none? ──► relays OFF (before anything else)
//!                │
//!                ▼
//!        handle.with(tick) ── panic / error ──► mask = OFF
//!                │
//!                ▼
//!           relays.set(mask)
//! ```
//!
//! A panicking tick is caught so that a bug in the engine still ends with
//! the relays open.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use kettle_common::config::LoopConfig;
use kettle_common::hal::{HalError, RelayActuator, RelayMask, TemperatureSensor};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::handle::KettleHandle;
use crate::safety::fail_safe::{SensorTransition, SensorWatch};

/// Stats are logged every this many cycles.
const STATS_LOG_CYCLES: u64 = 1000;

/// Write failures logged individually before throttling.
const WRITE_WARN_FIRST: u64 = 10;

/// Throttled write failures are logged every this many.
const WRITE_WARN_EVERY: u64 = 1000;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles that took longer than the period.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
    /// Actuator failure outside the loop (shutdown).
    #[error("hardware error: {0}")]
    Hal(#[from] HalError),
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Lock memory, pin the thread and raise it to SCHED_FIFO.
///
/// Call from the loop thread before [`CycleRunner::run`].
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Owns the drivers and drives the engine at a fixed period.
pub struct CycleRunner {
    handle: KettleHandle,
    sensor: Box<dyn TemperatureSensor>,
    relays: Box<dyn RelayActuator>,
    watch: SensorWatch,
    pub stats: CycleStats,
    cycle_time_ns: i64,
    /// Cycles between status lines; 0 disables them.
    status_interval: u64,
    write_failures: u64,
}

impl CycleRunner {
    pub fn new(
        handle: KettleHandle,
        sensor: Box<dyn TemperatureSensor>,
        relays: Box<dyn RelayActuator>,
        config: &LoopConfig,
    ) -> Self {
        let tick_ms = config.tick_ms.max(1);
        Self {
            handle,
            sensor,
            relays,
            watch: SensorWatch::new(),
            stats: CycleStats::new(),
            cycle_time_ns: tick_ms as i64 * 1_000_000,
            status_interval: config.status_log_interval_s * 1000 / tick_ms,
            write_failures: 0,
        }
    }

    pub fn handle(&self) -> &KettleHandle {
        &self.handle
    }

    pub fn sensor_watch(&self) -> &SensorWatch {
        &self.watch
    }

    pub const fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Loop until `running` clears, then open every relay.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        info!(
            period_ms = self.cycle_time_ns / 1_000_000,
            sensor = self.sensor.name(),
            relays = self.relays.name(),
            "Control loop running"
        );

        #[cfg(feature = "rt")]
        let result = self.run_rt_loop(running);

        #[cfg(not(feature = "rt"))]
        let result = self.run_sim_loop(running);

        info!(
            cycles = self.stats.cycle_count,
            avg_us = self.stats.avg_cycle_ns() / 1000,
            max_us = self.stats.max_cycle_ns / 1000,
            overruns = self.stats.overruns,
            "Control loop stopped"
        );
        let shutdown = self.shutdown();
        result.and(shutdown)
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")));
        let mut next_wake = now()?;

        while running.load(Ordering::Acquire) {
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start = now()?;
            self.step();
            let cycle_end = now()?;

            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            self.finish_cycle(duration_ns, 0);

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
            let woke = now()?;
            self.stats.max_latency_ns = self
                .stats
                .max_latency_ns
                .max(timespec_diff_ns(&woke, &next_wake).abs());
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, running: &AtomicBool) -> Result<(), CycleError> {
        use std::time::{Duration, Instant};

        let period = Duration::from_nanos(self.cycle_time_ns as u64);
        while running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            self.step();
            let elapsed = cycle_start.elapsed();
            self.finish_cycle(elapsed.as_nanos() as i64, 0);

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    fn finish_cycle(&mut self, duration_ns: i64, latency_ns: i64) {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns > self.cycle_time_ns {
            self.stats.overruns += 1;
            debug!(duration_us = duration_ns / 1000, "Cycle overrun");
        }
        if self.stats.cycle_count % STATS_LOG_CYCLES == 0 {
            debug!(
                cycles = self.stats.cycle_count,
                avg_us = self.stats.avg_cycle_ns() / 1000,
                max_us = self.stats.max_cycle_ns / 1000,
                overruns = self.stats.overruns,
                "Cycle stats"
            );
        }
        if self.status_interval > 0 && self.stats.cycle_count % self.status_interval == 0 {
            self.log_status();
        }
    }

    /// One cycle body.
    pub fn step(&mut self) {
        let reading = self.sensor.read_temperature();
        match self.watch.observe(reading.is_some()) {
            Some(SensorTransition::Lost) => {
                warn!(outages = self.watch.outages(), "Sensor reading lost, heater forced off");
            }
            Some(SensorTransition::Restored) => {
                info!(missed = self.watch.missed(), "Sensor reading restored");
            }
            None => {}
        }
        if reading.is_none() {
            self.write(RelayMask::empty());
        }

        let handle = &self.handle;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handle.with(|e| e.tick(reading))));
        let mask = match outcome {
            Ok(Ok(mask)) => mask,
            Ok(Err(e)) => {
                warn!(error = %e, "Control tick failed, relays off");
                RelayMask::empty()
            }
            Err(_) => {
                error!("Control tick panicked, relays off");
                RelayMask::empty()
            }
        };

        if reading.is_some() || !mask.is_empty() {
            self.write(mask);
        }
    }

    fn write(&mut self, mask: RelayMask) {
        if let Err(e) = self.relays.set_relays(mask) {
            self.write_failures += 1;
            let n = self.write_failures;
            if n <= WRITE_WARN_FIRST || n % WRITE_WARN_EVERY == 0 {
                warn!(error = %e, failures = n, ?mask, "Relay write failed");
            }
        }
    }

    fn log_status(&self) {
        let s = self.handle.summary();
        info!(
            status = %s.status,
            text = %s.text.replace('\n', " "),
            temp = ?s.temp,
            target = s.target,
            watts = s.applied_watts,
            relays = ?s.relays,
            timer = %s.timer,
            kwh = s.kwh,
            "Status"
        );
    }

    /// Open every relay and release the actuator.
    pub fn shutdown(&mut self) -> Result<(), CycleError> {
        if let Err(e) = self.relays.stop_all() {
            error!(error = %e, "Failed to open relays at shutdown");
        }
        self.relays.cleanup()?;
        info!("Relays released");
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// `a - b` in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
