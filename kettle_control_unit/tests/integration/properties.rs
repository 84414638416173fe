//! Property checks on the control primitives.

use kettle_common::consts::RELAY_COUNT;
use kettle_control_unit::control::allocator::allocate;
use kettle_control_unit::control::pid::{Pid, PidGains};
use kettle_control_unit::control::ramp::{estimate_minutes, RampCalibration};
use kettle_control_unit::state::latch::TempLatch;
use proptest::prelude::*;

// ── Helpers ──

const CAL: RampCalibration = RampCalibration {
    ref_rate: 1.3,
    ref_volume: 8.0,
};

fn gains() -> PidGains {
    PidGains {
        kp: 50.0,
        ki: 0.02,
        kd: 10.0,
        integral_window: 5.0,
        out_min: 0.0,
        out_max: 100.0,
    }
}

fn caps() -> impl Strategy<Value = [f64; RELAY_COUNT]> {
    prop::array::uniform3(0.0f64..3000.0)
}

// ── Tests ──

proptest! {
    #[test]
    fn test_pid_output_stays_in_range(
        readings in prop::collection::vec(-50.0f64..300.0, 1..200),
        setpoint in 0.0f64..215.0,
    ) {
        let mut pid = Pid::new(gains());
        for (i, t) in readings.iter().enumerate() {
            let out = pid.compute(i as f64 * 0.1, *t, setpoint);
            prop_assert!((0.0..=100.0).contains(&out), "{out}");
        }
    }

    #[test]
    fn test_pid_integral_is_zero_outside_window(
        warmup in prop::collection::vec(148.0f64..152.0, 1..50),
        far in 5.0f64..100.0,
    ) {
        let mut pid = Pid::new(gains());
        let mut now = 0.0;
        for t in &warmup {
            pid.compute(now, *t, 150.0);
            now += 0.1;
        }
        pid.compute(now, 150.0 - far, 150.0);
        prop_assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn test_allocation_never_exceeds_request(
        watts in 0.0f64..4000.0,
        caps in caps(),
    ) {
        let a = allocate(watts, &caps);
        prop_assert!(a.base_watts <= watts);
        prop_assert!(a.average_watts(&caps) <= watts + 1e-9);
        if let Some(ch) = a.pwm {
            prop_assert!(!a.base.is_on(ch.relay));
            prop_assert!(ch.duty > 0.0 && ch.duty <= 1.0);
        }
    }

    #[test]
    fn test_allocation_mask_only_adds_the_pwm_relay(
        watts in 0.0f64..4000.0,
        caps in caps(),
        now in 0.0f64..600.0,
    ) {
        let a = allocate(watts, &caps);
        let mask = a.mask_at(now, 30.0);
        prop_assert!(mask.contains(a.base));
        let extra = mask.difference(a.base);
        match a.pwm {
            Some(ch) => prop_assert!(extra.is_empty() || extra.is_on(ch.relay)),
            None => prop_assert!(extra.is_empty()),
        }
    }

    #[test]
    fn test_ramp_estimate_grows_with_target_and_volume(
        start in 40.0f64..120.0,
        target in 120.0f64..212.0,
        bump in 0.0f64..20.0,
        volume in 1.0f64..15.0,
    ) {
        let base = estimate_minutes(start, target, volume, None, &CAL);
        prop_assert!(base >= 0.0);
        prop_assert!(estimate_minutes(start, target + bump, volume, None, &CAL) >= base);
        prop_assert!(estimate_minutes(start, target, volume + bump, None, &CAL) >= base);
        prop_assert!(estimate_minutes(start, target, volume, Some(3600.0), &CAL) <= base);
    }

    #[test]
    fn test_latch_needs_an_unbroken_window(
        dips in prop::collection::vec(any::<bool>(), 1..120),
    ) {
        let mut latch = TempLatch::new(5.0);
        let mut window_start: Option<f64> = None;
        for (i, dip) in dips.iter().enumerate() {
            let now = i as f64 * 0.1;
            let temp = if *dip { 140.0 } else { 151.0 };
            let closed = latch.update(now, temp, 149.5);
            if *dip {
                window_start = None;
            } else if window_start.is_none() {
                window_start = Some(now);
            }
            if closed {
                let since = window_start.unwrap_or(now);
                prop_assert!(now - since >= 5.0);
            }
            if latch.is_reached() {
                break;
            }
        }
    }
}
