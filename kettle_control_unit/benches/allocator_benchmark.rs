//! Relay allocation benchmark: exhaustive subset search plus the PWM
//! mask lookup, across the full request range.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use kettle_control_unit::control::allocator::allocate;

const CAPS: [f64; 3] = [1000.0, 800.0, 1000.0];

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");
    for watts in [0.0, 900.0, 1800.0, 2500.0, 2800.0] {
        group.bench_with_input(BenchmarkId::from_parameter(watts), &watts, |b, &w| {
            b.iter(|| allocate(w, &CAPS));
        });
    }
    group.finish();
}

fn bench_mask_at(c: &mut Criterion) {
    let allocation = allocate(1900.0, &CAPS);
    let mut cycle = 0u64;

    c.bench_function("allocation_mask_at", |b| {
        b.iter(|| {
            cycle += 1;
            allocation.mask_at(cycle as f64 * 0.1, 30.0)
        });
    });
}

criterion_group!(benches, bench_allocate, bench_mask_at);
criterion_main!(benches);
