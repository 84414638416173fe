//! PID and ramp-estimate micro-benchmark.
//!
//! Both run once per tick (ramp only while a delayed start is pending),
//! so either should be a rounding error against the 100 ms period.

use criterion::{Criterion, criterion_group, criterion_main};

use kettle_control_unit::control::pid::{Pid, PidGains};
use kettle_control_unit::control::ramp::{RampCalibration, estimate_minutes};

const DT: f64 = 0.1; // 10 Hz

fn reference_gains() -> PidGains {
    PidGains {
        kp: 50.0,
        ki: 0.02,
        kd: 10.0,
        integral_window: 5.0,
        out_min: 0.0,
        out_max: 100.0,
    }
}

fn bench_pid_compute(c: &mut Criterion) {
    let mut pid = Pid::new(reference_gains());
    pid.compute(0.0, 150.0, 152.0);
    let mut cycle = 0u64;

    c.bench_function("pid_compute", |b| {
        b.iter(|| {
            cycle += 1;
            let t = cycle as f64 * DT;
            let temp = 151.0 + 2.0 * (t * 0.01).sin(); // drifting around target
            pid.compute(t, temp, 152.0)
        });
    });
}

fn bench_ramp_estimate(c: &mut Criterion) {
    let cal = RampCalibration {
        ref_rate: 1.3,
        ref_volume: 8.0,
    };
    let mut cycle = 0u64;

    c.bench_function("ramp_estimate", |b| {
        b.iter(|| {
            cycle += 1;
            let start = 60.0 + (cycle % 80) as f64;
            estimate_minutes(start, 152.0, 6.5, Some(1800.0), &cal)
        });
    });
}

criterion_group!(benches, bench_pid_compute, bench_ramp_estimate);
criterion_main!(benches);
