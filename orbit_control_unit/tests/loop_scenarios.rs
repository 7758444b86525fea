//! End-to-end scenarios against the simulated beamline hardware.
//!
//! These tests run the real loop: drift-free clock, watchdog, MPS,
//! telemetry frames over the channel transport and the JSON command
//! channel. Noise is disabled for determinism; the physics models are
//! otherwise unchanged.

use orbit_control_unit::api::ControlApi;
use orbit_control_unit::config::CuConfig;
use orbit_control_unit::cycle::RtLoop;
use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Bic, Bpm, Magnet, Sensor};
use orbit_ipc::endpoint::{command_channel, telemetry_channel, NullTelemetry};
use orbit_ipc::frame::Topic;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn quiet_config() -> CuConfig {
    let mut config = CuConfig::default();
    config.bpm.noise_enabled = false;
    config.bic.noise_enabled = false;
    config.magnet.noise_enabled = false;
    config
}

fn build_loop(config: &CuConfig) -> RtLoop<Bpm, Bic, Magnet> {
    let mut bpm = Bpm::new("BPM_01", 11);
    bpm.enable_noise(config.bpm.noise_enabled);
    bpm.set_chamber_radius(config.bpm.chamber_radius_mm);
    bpm.set_beam_current(config.bpm.beam_current_ma);
    bpm.set_electrode_gain_mismatch(0.0);
    bpm.set_beam_position(config.bpm.initial_offset_mm, 0.0);

    let mut bic = Bic::new("BIC_01", 12);
    bic.enable_noise(config.bic.noise_enabled);
    bic.set_beam_intensity(config.bic.true_intensity);
    bic.set_dark_current(config.bic.dark_current);

    let mut magnet = Magnet::new("MAG_01", 13);
    magnet.enable_noise(config.magnet.noise_enabled);
    magnet.set_slew_rate_limit(config.magnet.slew_rate_a_per_s);

    let mut api = ControlApi::new(bpm, bic, magnet);
    api.initialize().expect("hardware init");
    RtLoop::new(api, config)
}

#[test]
fn step_offset_converges_to_setpoint() {
    let mut config = quiet_config();
    config.bpm.initial_offset_mm = 1.0;
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, _client) = command_channel();

    // Two seconds to converge, one second to hold, at 1 kHz.
    rt_loop.run_cycles(3000, &mut sink, &mut server);

    let history = rt_loop.history_snapshot();
    assert!(history.len() >= 3000);

    // Converged within ±0.02 mm after at most 2 s...
    let settled: Vec<_> = history.iter().filter(|s| s.t_sec > 2.0).collect();
    assert!(!settled.is_empty());
    for sample in &settled {
        assert!(
            sample.pos.abs() <= 0.02,
            "cycle {} at t={:.3}s still at {} mm",
            sample.cycle,
            sample.t_sec,
            sample.pos
        );
    }

    // ...and the counters and timestamps are strictly monotonic.
    for pair in history.windows(2) {
        assert_eq!(pair[1].cycle, pair[0].cycle + 1);
        assert!(pair[1].t_sec > pair[0].t_sec);
    }
}

#[test]
fn deadline_misses_reduce_frequency() {
    let mut config = quiet_config();
    config.control_loop.frequency_hz = 100.0;
    let mut rt_loop = build_loop(&config);

    // Every cycle blows the 10 ms budget.
    rt_loop.set_synthetic_load(Some(Duration::from_millis(15)));

    let (mut sink, telemetry_rx) = telemetry_channel(256);
    let (mut server, _client) = command_channel();
    rt_loop.run_cycles(12, &mut sink, &mut server);

    assert!(rt_loop.shared().deadline_misses() >= 10);
    let expected = 100.0 * 0.8;
    assert!((rt_loop.shared().frequency_hz() - expected).abs() < 1e-9);

    // The alarm frame announces the reduction.
    let alarm = telemetry_rx
        .try_iter()
        .find(|frame| frame.topic == Topic::Alarm)
        .expect("no alarm frame published");
    let v: Value = serde_json::from_str(&alarm.payload).unwrap();
    assert_eq!(v["type"], "frequency_reduced");
    assert_eq!(v["old_freq"], 100.0);
    assert_eq!(v["new_freq"], 80.0);
    assert_eq!(v["reason"], "deadline_misses");
}

#[test]
fn mps_abort_latches_and_flags_telemetry() {
    let mut config = quiet_config();
    // Reads back as 50 000 counts/s after quantum efficiency and dark
    // subtraction; the beam sits 10 mm off axis.
    config.bic.true_intensity = 62_500.0;
    config.bpm.initial_offset_mm = 10.0;
    let mut rt_loop = build_loop(&config);

    let aborts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&aborts);
    rt_loop
        .mps_mut()
        .set_beam_abort_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

    let (mut sink, telemetry_rx) = telemetry_channel(64);
    let (mut server, _client) = command_channel();
    rt_loop.run_cycles(2, &mut sink, &mut server);

    assert_eq!(aborts.load(Ordering::Relaxed), 1);
    assert!(rt_loop.mps().is_abort_active());
    assert!(!rt_loop.mps().is_beam_permitted());
    assert!(!rt_loop.mps().check_safety(100.0, 0.0));
    assert!(rt_loop.shared().emergency_stop());
    assert!(!rt_loop.shared().control_enabled());

    let frames: Vec<_> = telemetry_rx
        .try_iter()
        .filter(|f| f.topic == Topic::Telemetry)
        .collect();
    assert!(!frames.is_empty());
    let v: Value = serde_json::from_str(&frames.last().unwrap().payload).unwrap();
    assert_eq!(v["mps_safe"], false);
    assert_eq!(v["mps_abort"], true);
    assert_eq!(v["emergency_stop"], true);
}

#[test]
fn out_of_band_frequency_request_is_clamped() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, client) = command_channel();

    assert!(client.send(r#"{"cmd":"set_freq","hz":5000}"#));
    rt_loop.run_cycles(1, &mut sink, &mut server);
    let reply = client.recv_response(Duration::from_millis(100)).unwrap();
    let v: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["ok"], true);

    assert!(client.send(r#"{"cmd":"get_status"}"#));
    rt_loop.run_cycles(1, &mut sink, &mut server);
    let status = client.recv_response(Duration::from_millis(100)).unwrap();
    let v: Value = serde_json::from_str(&status).unwrap();
    assert_eq!(v["loop_frequency"], 2000.0);

    // The lower bound clamps too.
    assert!(client.send(r#"{"cmd":"set_freq","hz":5}"#));
    rt_loop.run_cycles(1, &mut sink, &mut server);
    client.recv_response(Duration::from_millis(100)).unwrap();
    assert_eq!(rt_loop.shared().frequency_hz(), 10.0);
}

#[test]
fn invalid_commands_do_not_mutate_state() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let before = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);

    let reply = rt_loop.handle_command("{not json");
    let v: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "JSON parse error");

    let reply = rt_loop.handle_command(r#"{"cmd":"warp_drive"}"#);
    let v: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "Unknown command");

    let after = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);
    assert_eq!(before, after);
}

#[test]
fn status_is_stable_without_intervening_changes() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, _client) = command_channel();
    rt_loop.run_cycles(5, &mut sink, &mut server);

    let first = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);
    let second = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);
    assert_eq!(first, second);
}

#[test]
fn recommission_resets_loop_state() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, _client) = command_channel();
    rt_loop.run_cycles(10, &mut sink, &mut server);
    rt_loop.handle_command(r#"{"cmd":"set_setpoint","sp":0.5}"#);
    rt_loop.handle_command(r#"{"cmd":"emergency_stop"}"#);
    assert!(rt_loop.shared().emergency_stop());

    let reply = rt_loop.handle_command(r#"{"cmd":"recommission"}"#);
    let v: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(v["ok"], true);

    let status = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);
    let v: Value = serde_json::from_str(&status).unwrap();
    assert_eq!(v["loop_count"], 0);
    assert_eq!(v["deadline_misses"], 0);
    assert_eq!(v["emergency_stop"], false);
    assert_eq!(v["control_enabled"], true);
    assert_eq!(v["mps_safe"], true);
    assert_eq!(v["setpoint"], 0.0);

    // The loop is immediately operable again.
    rt_loop.run_cycles(2, &mut sink, &mut server);
    assert_eq!(rt_loop.shared().loop_count(), 2);
}

#[test]
fn emergency_stop_zeroes_actuator_until_reset() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, _client) = command_channel();

    rt_loop.handle_command(r#"{"cmd":"emergency_stop"}"#);
    rt_loop.run_cycles(1, &mut sink, &mut server);
    assert_eq!(rt_loop.api().magnet_current(), 0.0);

    // Direct set attempts are rejected and the reading stays zero.
    assert!(rt_loop.api_mut().set_magnet(1.0).is_err());
    assert_eq!(rt_loop.api().magnet_current(), 0.0);

    // enable_control is ignored while the latch is set.
    rt_loop.handle_command(r#"{"cmd":"enable_control","enable":true}"#);
    assert!(!rt_loop.shared().control_enabled());
}

#[test]
fn partial_set_pid_preserves_missing_gains() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    rt_loop.handle_command(r#"{"cmd":"set_pid","ki":0.2}"#);
    let status = rt_loop.handle_command(r#"{"cmd":"get_status"}"#);
    let v: Value = serde_json::from_str(&status).unwrap();
    assert_eq!(v["pid_gains"]["kp"], 0.6);
    assert_eq!(v["pid_gains"]["ki"], 0.2);
    assert_eq!(v["pid_gains"]["kd"], 0.0);
}

#[test]
fn stop_command_ends_the_loop() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let mut sink = NullTelemetry::new();
    let (mut server, client) = command_channel();

    assert!(client.send(r#"{"cmd":"stop"}"#));
    rt_loop.run_cycles(10, &mut sink, &mut server);

    assert!(!rt_loop.shared().is_running());
    // Well under the requested 10 cycles: the stop took effect.
    assert!(rt_loop.shared().loop_count() <= 2);
}

#[test]
fn sensor_fault_latches_emergency_but_loop_survives() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    // Kill the intensity counter mid-run.
    rt_loop.api_mut().bic.shutdown();

    let (mut sink, telemetry_rx) = telemetry_channel(64);
    let (mut server, _client) = command_channel();
    rt_loop.run_cycles(3, &mut sink, &mut server);

    assert!(rt_loop.shared().emergency_stop());

    let error_frames: Vec<_> = telemetry_rx
        .try_iter()
        .filter(|f| f.topic == Topic::Error)
        .collect();
    assert!(!error_frames.is_empty());
    let v: Value = serde_json::from_str(&error_frames[0].payload).unwrap();
    assert_eq!(v["type"], "loop_error");
    assert_eq!(v["error"], "NOT_INITIALIZED");

    // The loop kept cycling and is recoverable by recommission.
    rt_loop.api_mut().bic.initialize().unwrap();
    rt_loop.handle_command(r#"{"cmd":"recommission"}"#);
    let mut null_sink = NullTelemetry::new();
    rt_loop.run_cycles(2, &mut null_sink, &mut server);
    assert!(!rt_loop.shared().emergency_stop());
    assert_eq!(rt_loop.shared().loop_count(), 2);
}

#[test]
fn shutdown_emits_status_frame() {
    let config = quiet_config();
    let mut rt_loop = build_loop(&config);

    let (mut sink, telemetry_rx) = telemetry_channel(64);
    let (mut server, client) = command_channel();

    assert!(client.send(r#"{"cmd":"stop"}"#));
    rt_loop.run_cycles(5, &mut sink, &mut server);
    rt_loop.finish(&mut sink);

    let status_frame = telemetry_rx
        .try_iter()
        .find(|f| f.topic == Topic::Status)
        .expect("no shutdown frame");
    let v: Value = serde_json::from_str(&status_frame.payload).unwrap();
    assert_eq!(v["type"], "shutdown");
    assert_eq!(v["loop_count"], rt_loop.shared().loop_count());
}
