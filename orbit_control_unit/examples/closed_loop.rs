//! Closed-loop demonstration: correct a 1 mm orbit error at 200 Hz with
//! noisy instrumentation, then print the run summary.
//!
//! ```sh
//! cargo run -p orbit_control_unit --example closed_loop
//! ```

use orbit_control_unit::api::ControlApi;
use orbit_control_unit::config::CuConfig;
use orbit_control_unit::cycle::RtLoop;
use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Bic, Bpm, Magnet};
use orbit_ipc::endpoint::{command_channel, telemetry_channel};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt().compact().init();

    let mut config = CuConfig::default();
    config.control_loop.frequency_hz = 200.0;
    config.bpm.initial_offset_mm = 1.0;

    // Seeded instruments: this run reproduces exactly.
    let mut bpm = Bpm::new("BPM_01", 2024);
    bpm.set_beam_current(config.bpm.beam_current_ma);
    bpm.set_beam_position(config.bpm.initial_offset_mm, 0.0);

    let mut bic = Bic::new("BIC_01", 2025);
    bic.set_beam_intensity(config.bic.true_intensity);

    let magnet = Magnet::new("MAG_01", 2026);

    let mut api = ControlApi::new(bpm, bic, magnet);
    api.initialize().expect("hardware init");

    let mut rt_loop = RtLoop::new(api, &config);
    let (mut sink, telemetry_rx) = telemetry_channel(1024);
    let (mut server, client) = command_channel();

    // Two seconds of closed-loop correction.
    rt_loop.run_cycles(400, &mut sink, &mut server);

    // Ask the loop for its own view of the run.
    client.send(r#"{"cmd":"get_status"}"#);
    rt_loop.run_cycles(1, &mut sink, &mut server);
    if let Some(status) = client.recv_response(Duration::from_millis(100)) {
        println!("status: {status}");
    }

    let stats = rt_loop.stats_window();
    println!(
        "cycles: {}  pos mean: {:+.4} mm  pos std: {:.4} mm  error rms: {:.4} mm",
        stats.sample_count,
        stats.pos_mean,
        stats.pos_std(),
        stats.error_rms(),
    );
    println!(
        "loop time: mean {:.1} µs  max {:.1} µs  deadline misses: {}",
        stats.mean_loop_time_us,
        stats.max_loop_time_us,
        stats.deadline_miss_count,
    );

    let frames = telemetry_rx.try_iter().count();
    println!("telemetry frames published: {frames}");

    // Show the last few samples the way an operator display would.
    for sample in rt_loop.history_snapshot().iter().rev().take(3).rev() {
        println!(
            "t={:7.3}s cycle={:4} pos={:+.4} mm mag={:+.4} A {}",
            sample.t_sec,
            sample.cycle,
            sample.pos,
            sample.magnet_current,
            if sample.is_healthy() { "ok" } else { "DEGRADED" },
        );
    }
}
