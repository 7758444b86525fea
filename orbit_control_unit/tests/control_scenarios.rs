//! Controller-level scenarios: PID against synthetic plants, no clock.
//!
//! These run the controller at simulated 1 kHz without wall-clock pacing,
//! so thousands of simulated seconds execute instantly.

use orbit_control_unit::control::{Pid, PidGains};

const DT: f64 = 0.001;

#[test]
fn anti_windup_recovery_after_long_saturation() {
    // Aggressive integral gain, a memoryless plant with gain 0.1 and the
    // output clamped to ±1: an unreachable setpoint saturates the output
    // for five simulated seconds.
    let mut pid = Pid::new(PidGains {
        kp: 1.0,
        ki: 10.0,
        kd: 0.0,
    });
    pid.set_setpoint(5.0, true);

    let plant_gain = 0.1;
    let mut position = 0.0;

    for _ in 0..5000 {
        let u = pid.step(position, DT, -1.0, 1.0);
        position = plant_gain * u;
    }
    // Saturated the whole time; the conditional anti-windup kept the
    // integrator from accumulating into the saturation.
    assert!(position <= 0.1 + 1e-9);
    assert!(
        pid.integrator() < 1.0,
        "integrator wound up to {}",
        pid.integrator()
    );

    // Drop the setpoint into the reachable band: the loop must settle
    // within ±0.02 inside three simulated seconds.
    pid.set_setpoint(0.1, true);
    let mut settled_at = None;
    for n in 0..3000 {
        let u = pid.step(position, DT, -1.0, 1.0);
        position = plant_gain * u;
        if (position - 0.1).abs() <= 0.02 {
            settled_at.get_or_insert(n);
        } else {
            settled_at = None;
        }
    }
    let settled_at = settled_at.expect("never settled after saturation");
    assert!(
        settled_at < 3000,
        "settled too late: step {settled_at}"
    );
    assert!((position - 0.1).abs() <= 0.02);
}

#[test]
fn first_order_plant_tracks_setpoint_changes() {
    // Discrete first-order plant driven by the controller; verifies
    // bumpless setpoint changes do not disturb a settled loop.
    let mut pid = Pid::new(PidGains {
        kp: 2.0,
        ki: 5.0,
        kd: 0.01,
    });
    pid.set_setpoint(1.0, true);

    let mut position = 0.0;
    let alpha = 0.05;
    for _ in 0..4000 {
        let u = pid.step(position, DT, -10.0, 10.0);
        position += alpha * (u - position);
    }
    assert!((position - 1.0).abs() < 0.02, "position {position}");

    // Move the setpoint; the derivative term must not spike.
    pid.set_setpoint(-1.0, true);
    let u = pid.step(position, DT, -10.0, 10.0);
    assert!(
        pid.last_derivative().abs() < 1.0,
        "derivative kick: {}",
        pid.last_derivative()
    );
    let _ = u;

    for _ in 0..4000 {
        let u = pid.step(position, DT, -10.0, 10.0);
        position += alpha * (u - position);
    }
    assert!((position + 1.0).abs() < 0.02, "position {position}");
}
