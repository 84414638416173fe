//! Debounced "temperature reached" latch.
//!
//! The reached condition (`current >= threshold`) must hold continuously
//! for `debounce_s` before the latch closes; any dip restarts the window.
//! Once closed the latch stays closed until [`TempLatch::reset`], which
//! keeps a boiling kettle from re-arming its step timer on every bubble.

#[derive(Debug, Clone, PartialEq)]
pub struct TempLatch {
    debounce_s: f64,
    reached: bool,
    /// Start of the current above-threshold window.
    pending_since: Option<f64>,
}

impl TempLatch {
    pub const fn new(debounce_s: f64) -> Self {
        Self {
            debounce_s,
            reached: false,
            pending_since: None,
        }
    }

    #[inline]
    pub const fn is_reached(&self) -> bool {
        self.reached
    }

    /// Open the latch and drop any pending window.
    pub fn reset(&mut self) {
        self.reached = false;
        self.pending_since = None;
    }

    /// Close the latch without debouncing.
    pub fn force(&mut self) {
        self.reached = true;
        self.pending_since = None;
    }

    /// Feed one reading. Returns `true` on the call that closes the latch.
    pub fn update(&mut self, now: f64, current: f64, threshold: f64) -> bool {
        if self.reached {
            return false;
        }
        if current >= threshold {
            match self.pending_since {
                None => self.pending_since = Some(now),
                Some(since) if now - since >= self.debounce_s => {
                    self.force();
                    return true;
                }
                Some(_) => {}
            }
        } else {
            self.pending_since = None;
        }
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
