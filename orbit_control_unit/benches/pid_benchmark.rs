//! PID hot-path micro-benchmark.
//!
//! Measures throughput of a single control step under the conditions the
//! loop sees at 1 kHz: small error, active integrator, clamped output.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use orbit_control_unit::control::{Pid, PidGains};

const DT: f64 = 0.001; // 1 kHz

fn reference_pid() -> Pid {
    let mut pid = Pid::new(PidGains {
        kp: 0.6,
        ki: 0.05,
        kd: 0.02,
    });
    pid.set_integrator_limits(-10.0, 10.0);
    pid.set_setpoint(0.0, true);
    pid
}

fn bench_pid_step(c: &mut Criterion) {
    let mut pid = reference_pid();
    let mut measurement = 1.0;

    c.bench_function("pid_step", |b| {
        b.iter(|| {
            // Drift the measurement so the derivative path stays live.
            measurement = 0.999 * measurement;
            black_box(pid.step(black_box(measurement), DT, -2.0, 2.0))
        })
    });
}

fn bench_pid_step_saturated(c: &mut Criterion) {
    let mut pid = reference_pid();
    pid.set_setpoint(100.0, true);

    c.bench_function("pid_step_saturated", |b| {
        b.iter(|| black_box(pid.step(black_box(0.0), DT, -2.0, 2.0)))
    });
}

criterion_group!(benches, bench_pid_step, bench_pid_step_saturated);
criterion_main!(benches);
