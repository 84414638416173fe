//! Moving-average wrapper for a noisy probe.

use heapless::Deque;
use kettle_common::hal::TemperatureSensor;

/// Samples averaged per reading.
pub const SMOOTHING_WINDOW: usize = 5;

/// Averages the last [`SMOOTHING_WINDOW`] valid readings of `S`.
///
/// A missing reading is passed through as `None` without disturbing the
/// window, so the average resumes from the same history once the probe
/// recovers.
pub struct SmoothedSensor<S> {
    inner: S,
    window: Deque<f64, SMOOTHING_WINDOW>,
}

impl<S: TemperatureSensor> SmoothedSensor<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            window: Deque::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn push(&mut self, value: f64) {
        if self.window.is_full() {
            self.window.pop_front();
        }
        // Cannot fail: a slot was freed above.
        let _ = self.window.push_back(value);
    }

    fn average(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }
}

impl<S: TemperatureSensor> TemperatureSensor for SmoothedSensor<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn read_temperature(&mut self) -> Option<f64> {
        let raw = self.inner.read_temperature().filter(|v| v.is_finite())?;
        self.push(raw);
        self.average()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Option<f64>>);

    impl TemperatureSensor for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn read_temperature(&mut self) -> Option<f64> {
            self.0.pop_front().flatten()
        }
    }

    fn smoothed(values: &[Option<f64>]) -> SmoothedSensor<Scripted> {
        SmoothedSensor::new(Scripted(values.iter().copied().collect()))
    }

    #[test]
    fn averages_over_last_five() {
        let mut s = smoothed(&[
            Some(100.0),
            Some(110.0),
            Some(120.0),
            Some(130.0),
            Some(140.0),
            Some(150.0),
        ]);
        assert_eq!(s.read_temperature(), Some(100.0));
        assert_eq!(s.read_temperature(), Some(105.0));
        for _ in 0..3 {
            s.read_temperature();
        }
        // window now 110..150
        assert_eq!(s.read_temperature(), Some(130.0));
    }

    #[test]
    fn dropout_passes_through_and_keeps_history() {
        let mut s = smoothed(&[Some(100.0), None, Some(f64::NAN), Some(110.0)]);
        assert_eq!(s.read_temperature(), Some(100.0));
        assert_eq!(s.read_temperature(), None);
        assert_eq!(s.read_temperature(), None);
        assert_eq!(s.read_temperature(), Some(105.0));
    }
}
