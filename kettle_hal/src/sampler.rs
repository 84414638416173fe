//! Background sensor sampling.
//!
//! A 1-Wire conversion takes most of a second and a wedged bus can block
//! indefinitely, so the physical probe never runs on the control loop.
//! [`SampledSensor`] moves it onto its own thread and hands the loop the
//! latest sample, or `None` once that sample is older than `stale_after`.
//! A stalled probe therefore degrades into the loop's fail-safe path
//! instead of stalling the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use kettle_common::clock::Clock;
use kettle_common::hal::{HalError, TemperatureSensor};
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    value: f64,
    /// Monotonic time the read completed [s].
    at: f64,
}

/// Latest sample if it is no older than `stale_after` [s].
fn fresh(sample: Option<Sample>, now: f64, stale_after: f64) -> Option<f64> {
    sample
        .filter(|s| now - s.at <= stale_after)
        .map(|s| s.value)
}

/// Loop-side view of a probe read on a background thread.
pub struct SampledSensor {
    name: &'static str,
    latest: Arc<Mutex<Option<Sample>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    clock: Arc<dyn Clock>,
    stale_after: f64,
}

impl SampledSensor {
    /// Start sampling `sensor` every `period`.
    pub fn spawn(
        mut sensor: Box<dyn TemperatureSensor>,
        clock: Arc<dyn Clock>,
        period: Duration,
        stale_after: Duration,
    ) -> Result<Self, HalError> {
        let name = sensor.name();
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let thread_latest = Arc::clone(&latest);
        let thread_running = Arc::clone(&running);
        let thread_clock = Arc::clone(&clock);
        let handle = std::thread::Builder::new()
            .name("kettle-sampler".into())
            .spawn(move || {
                debug!(sensor = name, "Sampler thread started");
                while thread_running.load(Ordering::Acquire) {
                    let reading = sensor.read_temperature();
                    let at = thread_clock.monotonic();
                    *thread_latest.lock() = reading.map(|value| Sample { value, at });
                    std::thread::sleep(period);
                }
                debug!(sensor = name, "Sampler thread stopped");
            })
            .map_err(|e| HalError::InitFailed(format!("sampler thread: {e}")))?;

        info!(
            sensor = name,
            period_ms = period.as_millis() as u64,
            stale_ms = stale_after.as_millis() as u64,
            "Sensor sampler running"
        );
        Ok(Self {
            name,
            latest,
            running,
            handle: Some(handle),
            clock,
            stale_after: stale_after.as_secs_f64(),
        })
    }

    /// Stop the thread and wait for its current read to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl TemperatureSensor for SampledSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn read_temperature(&mut self) -> Option<f64> {
        fresh(*self.latest.lock(), self.clock.monotonic(), self.stale_after)
    }
}

impl Drop for SampledSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kettle_common::clock::ManualClock;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Probe that yields whatever the test sends, blocking in between.
    struct Fed(mpsc::Receiver<Option<f64>>);

    impl TemperatureSensor for Fed {
        fn name(&self) -> &'static str {
            "fed"
        }

        fn read_temperature(&mut self) -> Option<f64> {
            self.0.recv().ok().flatten()
        }
    }

    fn wait_for(sensor: &mut SampledSensor, want: Option<f64>) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if sensor.read_temperature() == want {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn fresh_filters_by_age() {
        let s = Some(Sample { value: 150.0, at: 10.0 });
        assert_eq!(fresh(s, 12.0, 3.0), Some(150.0));
        assert_eq!(fresh(s, 13.0, 3.0), Some(150.0));
        assert_eq!(fresh(s, 13.5, 3.0), None);
        assert_eq!(fresh(None, 0.0, 3.0), None);
    }

    #[test]
    fn stalled_probe_goes_stale() {
        let clock = ManualClock::new(0.0, Utc::now());
        let (tx, rx) = mpsc::channel();
        let mut sampler = SampledSensor::spawn(
            Box::new(Fed(rx)),
            Arc::new(clock.clone()),
            Duration::from_millis(1),
            Duration::from_secs(3),
        )
        .unwrap();

        tx.send(Some(150.0)).unwrap();
        assert!(wait_for(&mut sampler, Some(150.0)));

        // Probe is now blocked waiting for the next value.
        clock.advance(2.0);
        assert_eq!(sampler.read_temperature(), Some(150.0));
        clock.advance(2.0);
        assert_eq!(sampler.read_temperature(), None);

        tx.send(Some(151.0)).unwrap();
        assert!(wait_for(&mut sampler, Some(151.0)));

        tx.send(None).unwrap();
        assert!(wait_for(&mut sampler, None));

        drop(tx);
        sampler.stop();
    }
}
