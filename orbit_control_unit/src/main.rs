//! # Orbit Control Unit binary
//!
//! Wires the simulated beamline instrumentation to the feedback loop and
//! runs it against JSON-line standard I/O:
//!
//! - telemetry frames go to stdout as `<topic> <json>` lines
//! - commands are read from stdin, one JSON object per line, with the
//!   response echoed to stderr
//!
//! Production transports replace the stdio bridges; the loop itself only
//! sees the `TelemetrySink`/`CommandEndpoint` interfaces.

use orbit_common::config::LogLevel;
use orbit_control_unit::api::ControlApi;
use orbit_control_unit::config::{load_config, CuConfig};
use orbit_control_unit::cycle::RtLoop;
use orbit_control_unit::rt;
use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Bic, Bpm, Magnet, Sensor};
use orbit_ipc::endpoint::{command_channel, telemetry_channel};
use std::io::BufRead;
use std::path::Path;
use std::process;
use std::time::Duration;
use tracing::{info, warn, Level};

fn log_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/cu.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        match load_config(Path::new(&config_path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("FATAL: {e}");
                process::exit(1);
            }
        }
    } else {
        eprintln!("orbit_control_unit: no config at {config_path}, using defaults");
        CuConfig::default()
    };

    tracing_subscriber::fmt()
        .compact()
        .with_max_level(log_level(config.shared.log_level))
        .init();

    info!(
        service = %config.shared.service_name,
        frequency_hz = config.control_loop.frequency_hz,
        "orbit control unit starting"
    );

    // ── Hardware (simulation models) ────────────────────────────
    let mut bpm = Bpm::new("BPM_01", config.bpm.noise_seed);
    bpm.enable_noise(config.bpm.noise_enabled);
    bpm.set_chamber_radius(config.bpm.chamber_radius_mm);
    bpm.set_beam_current(config.bpm.beam_current_ma);
    bpm.set_beam_position(config.bpm.initial_offset_mm, 0.0);

    let mut bic = Bic::new("BIC_01", config.bic.noise_seed);
    bic.enable_noise(config.bic.noise_enabled);
    bic.set_beam_intensity(config.bic.true_intensity);
    bic.set_dark_current(config.bic.dark_current);

    let mut magnet = Magnet::new("MAG_01", config.magnet.noise_seed);
    magnet.enable_noise(config.magnet.noise_enabled);
    magnet.set_slew_rate_limit(config.magnet.slew_rate_a_per_s);

    let mut api = ControlApi::new(bpm, bic, magnet);
    if let Err(e) = api.initialize() {
        eprintln!("FATAL: hardware initialization failed: {e}");
        process::exit(1);
    }
    if !api.bpm.self_test() {
        warn!("BPM self test failed, continuing with degraded confidence");
    }

    // ── RT elevation (advisory) ─────────────────────────────────
    if let Err(e) = rt::rt_setup(0, 80) {
        warn!(error = %e, "real-time setup unavailable, running best-effort");
    }

    // ── Transport bridges ───────────────────────────────────────
    let (mut sink, telemetry_rx) = telemetry_channel(1024);
    let (mut command_server, command_client) = command_channel();

    let printer = std::thread::spawn(move || {
        for frame in telemetry_rx {
            println!("{} {}", frame.topic.as_str(), frame.payload);
        }
    });

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match command_client.request(line, Duration::from_secs(2)) {
                Some(response) => eprintln!("{response}"),
                None => eprintln!(r#"{{"ok":false,"error":"No response from loop"}}"#),
            }
        }
    });

    // ── Run ─────────────────────────────────────────────────────
    let mut rt_loop = RtLoop::new(api, &config);
    info!("entering control loop");
    rt_loop.run(&mut sink, &mut command_server);

    info!(
        cycles = rt_loop.shared().loop_count(),
        deadline_misses = rt_loop.shared().deadline_misses(),
        "control loop stopped"
    );

    drop(sink);
    let _ = printer.join();
}
