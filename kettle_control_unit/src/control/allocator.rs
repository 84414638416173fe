//! Relay allocation with single-channel PWM.
//!
//! A wattage request is served by the subset of relays whose summed
//! capacity is the largest not exceeding the request. Whatever is left
//! over is time-proportioned on the first unused relay:
//!
//! ```text
//!   request 1900 W, caps [1000, 800, 1000]
//!
//!   subset  R1+R2 = 1800 W   (R2+R3 ties, first found wins)
//!   remain  100 W  → R3 duty 0.1
//!
//!   R3:  ███───────────────────────────  (3 s on / 30 s cycle)
//! ```

use kettle_common::consts::RELAY_COUNT;
use kettle_common::hal::RelayMask;
use static_assertions::const_assert;

// Exhaustive subset search.
const_assert!(RELAY_COUNT <= 8);

const SUBSETS: u16 = 1 << RELAY_COUNT;

/// Time-proportioned remainder on one relay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmChannel {
    pub relay: usize,
    /// Fraction of the PWM cycle the relay is closed, in (0, 1].
    pub duty: f64,
}

/// Result of one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Allocation {
    /// Relays held fully on.
    pub base: RelayMask,
    /// Summed capacity of `base` [W].
    pub base_watts: f64,
    pub pwm: Option<PwmChannel>,
}

impl Allocation {
    /// Relay states at monotonic time `now` for a `cycle_s` PWM period.
    pub fn mask_at(&self, now: f64, cycle_s: f64) -> RelayMask {
        let mut mask = self.base;
        if let Some(ch) = self.pwm {
            if cycle_s > 0.0 && now.rem_euclid(cycle_s) < ch.duty * cycle_s {
                mask |= RelayMask::relay(ch.relay);
            }
        }
        mask
    }

    /// Average power over a PWM cycle [W].
    pub fn average_watts(&self, caps: &[f64; RELAY_COUNT]) -> f64 {
        self.base_watts + self.pwm.map_or(0.0, |ch| ch.duty * caps[ch.relay])
    }
}

/// Split `target_watts` across relays with capacities `caps`.
///
/// A non-positive (or NaN) request yields an empty allocation.
pub fn allocate(target_watts: f64, caps: &[f64; RELAY_COUNT]) -> Allocation {
    let mut best = RelayMask::empty();
    let mut best_sum = 0.0;

    for bits in 0..SUBSETS {
        let mask = RelayMask::from_bits_truncate(bits as u8);
        let sum = mask.watts(caps);
        if sum <= target_watts && sum > best_sum {
            best = mask;
            best_sum = sum;
        }
    }

    let remainder = target_watts - best_sum;
    let pwm = if remainder > 0.0 {
        (0..RELAY_COUNT)
            .find(|&i| !best.is_on(i) && caps[i] > 0.0)
            .map(|i| PwmChannel {
                relay: i,
                duty: (remainder / caps[i]).min(1.0),
            })
    } else {
        None
    };

    Allocation {
        base: best,
        base_watts: best_sum,
        pwm,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
