//! Latched hard-stop override.
//!
//! While engaged every relay is held open regardless of mode. Only an
//! explicit Start, Resume, StartManual, Stop or Reset clears it. Every
//! other command, Pause included, leaves it engaged.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardStop {
    engaged: bool,
    /// Monotonic time of the last engagement.
    engaged_at: Option<f64>,
    /// Engagements since process start.
    count: u64,
}

impl HardStop {
    pub const fn new() -> Self {
        Self {
            engaged: false,
            engaged_at: None,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_engaged(&self) -> bool {
        self.engaged
    }

    #[inline]
    pub const fn engaged_at(&self) -> Option<f64> {
        self.engaged_at
    }

    #[inline]
    pub const fn count(&self) -> u64 {
        self.count
    }

    pub fn engage(&mut self, now: f64) {
        if !self.engaged {
            self.engaged = true;
            self.engaged_at = Some(now);
            self.count += 1;
        }
    }

    /// Release the override. Returns `true` if it was engaged.
    pub fn clear(&mut self) -> bool {
        std::mem::replace(&mut self.engaged, false)
    }
}
