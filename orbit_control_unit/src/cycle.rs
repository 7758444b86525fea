//! The control loop orchestrator.
//!
//! [`RtLoop`] owns the PID state, limits, watchdog, clock and counters;
//! it references the hardware bundle and the machine protection system.
//! Each cycle runs:
//!
//! 1. sensor reads (failures latch emergency stop, never kill the loop)
//! 2. MPS evaluation
//! 3. PID step and actuator command (when control is permitted)
//! 4. closed-loop plant-coupling injection into the simulated BPM
//! 5. watchdog check and timing statistics
//! 6. telemetry frame publication
//! 7. non-blocking command drain (≤1 ms)
//! 8. drift-free wait for the next tick
//!
//! Observer threads watch the loop through [`LoopShared`]: counters are
//! relaxed atomics, and the `running` flag uses release/acquire so a
//! reader that sees the loop stopped also sees its final counters.

use crate::api::ControlApi;
use crate::clock::PeriodicClock;
use crate::config::CuConfig;
use crate::control::{Pid, PidGains};
use crate::safety::MachineProtectionSystem;
use crate::watchdog::Watchdog;
use orbit_common::atomic::AtomicF64;
use orbit_common::consts::{
    period_from_frequency, COMMAND_POLL_TIMEOUT, FREQUENCY_REDUCTION_FACTOR,
    FREQUENCY_REDUCTION_MISS_INTERVAL,
};
use orbit_common::limits::Limits;
use orbit_common::ring::RingBuffer;
use orbit_common::telemetry::{TelemetrySample, TelemetryStats};
use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Actuator, Sensor};
use orbit_ipc::endpoint::{CommandEndpoint, TelemetrySink};
use orbit_ipc::frame::{self, CycleFlags, Topic};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Loop state observable from other threads without locks.
#[derive(Debug)]
pub struct LoopShared {
    running: AtomicBool,
    control_enabled: AtomicBool,
    emergency_stop: AtomicBool,
    frequency_hz: AtomicF64,
    loop_count: AtomicU64,
    deadline_misses: AtomicU64,
    avg_loop_time_ms: AtomicF64,
    max_loop_time_ms: AtomicF64,
    last_loop_time_ms: AtomicF64,
}

impl LoopShared {
    fn new(frequency_hz: f64, control_enabled: bool) -> Self {
        Self {
            running: AtomicBool::new(true),
            control_enabled: AtomicBool::new(control_enabled),
            emergency_stop: AtomicBool::new(false),
            frequency_hz: AtomicF64::new(frequency_hz),
            loop_count: AtomicU64::new(0),
            deadline_misses: AtomicU64::new(0),
            avg_loop_time_ms: AtomicF64::new(0.0),
            max_loop_time_ms: AtomicF64::new(0.0),
            last_loop_time_ms: AtomicF64::new(0.0),
        }
    }

    /// True while the loop is (or should keep) running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to exit after the current cycle.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Control calculation enabled.
    pub fn control_enabled(&self) -> bool {
        self.control_enabled.load(Ordering::Acquire)
    }

    /// Emergency stop latched.
    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop.load(Ordering::Acquire)
    }

    /// Current loop frequency [Hz].
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz.load(Ordering::Relaxed)
    }

    /// Completed cycles.
    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::Relaxed)
    }

    /// Cumulative deadline misses.
    pub fn deadline_misses(&self) -> u64 {
        self.deadline_misses.load(Ordering::Relaxed)
    }

    /// Running-average cycle execution time [ms].
    pub fn avg_loop_time_ms(&self) -> f64 {
        self.avg_loop_time_ms.load(Ordering::Relaxed)
    }

    /// Maximum cycle execution time [ms].
    pub fn max_loop_time_ms(&self) -> f64 {
        self.max_loop_time_ms.load(Ordering::Relaxed)
    }

    /// Most recent cycle execution time [ms].
    pub fn last_loop_time_ms(&self) -> f64 {
        self.last_loop_time_ms.load(Ordering::Relaxed)
    }

    // Mutators reserved for the loop thread (cycle body and command
    // dispatch); observers only read.

    pub(crate) fn set_frequency(&self, hz: f64) {
        self.frequency_hz.store(hz, Ordering::Relaxed);
    }

    pub(crate) fn set_control_enabled(&self, enabled: bool) {
        self.control_enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn latch_emergency(&self) {
        self.emergency_stop.store(true, Ordering::Release);
    }

    pub(crate) fn clear_emergency(&self) {
        self.emergency_stop.store(false, Ordering::Release);
    }
}

/// Soft real-time orbit feedback loop.
pub struct RtLoop<P, I, M>
where
    P: Sensor + BeamPlant,
    I: Sensor,
    M: Actuator,
{
    pub(crate) api: ControlApi<P, I, M>,
    pub(crate) pid: Pid,
    pub(crate) limits: Limits,
    pub(crate) mps: MachineProtectionSystem,
    pub(crate) watchdog: Watchdog,
    pub(crate) shared: Arc<LoopShared>,
    clock: PeriodicClock,

    history: RingBuffer<TelemetrySample>,
    pub(crate) stats_window: TelemetryStats,

    coupling_gain: f64,
    chamber_radius_mm: f64,
    synthetic_load: Option<Duration>,

    pub(crate) start_time: Instant,
    running_avg_ms: f64,
}

impl<P, I, M> RtLoop<P, I, M>
where
    P: Sensor + BeamPlant,
    I: Sensor,
    M: Actuator,
{
    /// Build the loop from its configuration and hardware bundle.
    pub fn new(api: ControlApi<P, I, M>, config: &CuConfig) -> Self {
        let mut pid = Pid::new(PidGains {
            kp: config.pid.kp,
            ki: config.pid.ki,
            kd: config.pid.kd,
        });
        pid.set_integrator_limits(config.pid.integ_min, config.pid.integ_max);
        pid.set_setpoint(config.pid.setpoint, true);

        let limits = Limits {
            magnet_min: config.magnet.min_current_a,
            magnet_max: config.magnet.max_current_a,
            ..Limits::default()
        };

        let mut mps = MachineProtectionSystem::new();
        for id in ["BLM_UPSTREAM", "BLM_TARGET", "BLM_DOWNSTREAM"] {
            if let Some(blm) = mps.blm(id) {
                blm.set_warning_threshold(config.mps.warning_threshold);
                blm.set_abort_threshold(config.mps.abort_threshold);
            }
        }

        let period = period_from_frequency(config.control_loop.frequency_hz);

        Self {
            api,
            pid,
            limits,
            mps,
            watchdog: Watchdog::new(period),
            shared: Arc::new(LoopShared::new(
                config.control_loop.frequency_hz,
                config.control_loop.control_enabled,
            )),
            clock: PeriodicClock::new(period),
            history: RingBuffer::new(config.control_loop.history_depth),
            stats_window: TelemetryStats::new(),
            coupling_gain: config.control_loop.coupling_gain,
            chamber_radius_mm: config.bpm.chamber_radius_mm,
            synthetic_load: None,
            start_time: Instant::now(),
            running_avg_ms: 0.0,
        }
    }

    /// Observer handle onto the loop state.
    pub fn shared(&self) -> Arc<LoopShared> {
        Arc::clone(&self.shared)
    }

    /// Machine protection system (callback installation, inspection).
    pub fn mps_mut(&mut self) -> &mut MachineProtectionSystem {
        &mut self.mps
    }

    /// Machine protection system, read-only.
    pub fn mps(&self) -> &MachineProtectionSystem {
        &self.mps
    }

    /// Hardware bundle, read-only (device inspection).
    pub fn api(&self) -> &ControlApi<P, I, M> {
        &self.api
    }

    /// Hardware bundle, mutable (beam-condition setup, commissioning).
    pub fn api_mut(&mut self) -> &mut ControlApi<P, I, M> {
        &mut self.api
    }

    /// Telemetry history in chronological order.
    pub fn history_snapshot(&self) -> Vec<TelemetrySample> {
        self.history.snapshot()
    }

    /// Aggregate telemetry statistics since start or recommission.
    pub fn stats_window(&self) -> &TelemetryStats {
        &self.stats_window
    }

    /// Inject synthetic per-cycle work, for timing commissioning. `None`
    /// disables the load.
    pub fn set_synthetic_load(&mut self, load: Option<Duration>) {
        self.synthetic_load = load;
    }

    /// Re-apply a frequency to the clock and watchdog budget.
    pub(crate) fn apply_frequency(&mut self, hz: f64) {
        let period = period_from_frequency(hz);
        self.clock.set_period(period);
        self.watchdog.set_budget(period);
    }

    /// Zero the cycle counters and timing statistics (recommissioning).
    pub(crate) fn reset_timing_stats(&mut self) {
        self.running_avg_ms = 0.0;
        self.shared.loop_count.store(0, Ordering::Relaxed);
        self.shared.deadline_misses.store(0, Ordering::Relaxed);
        self.shared.avg_loop_time_ms.store(0.0, Ordering::Relaxed);
        self.shared.max_loop_time_ms.store(0.0, Ordering::Relaxed);
        self.shared.last_loop_time_ms.store(0.0, Ordering::Relaxed);
    }

    /// Run until an external stop request or a `stop` command.
    pub fn run<S: TelemetrySink, C: CommandEndpoint>(&mut self, sink: &mut S, commands: &mut C) {
        self.start_time = Instant::now();
        self.apply_frequency(self.shared.frequency_hz());

        while self.shared.is_running() {
            self.cycle(sink, commands);
        }

        self.finish(sink);
    }

    /// Run a bounded number of cycles (commissioning, tests), leaving the
    /// loop restartable.
    pub fn run_cycles<S: TelemetrySink, C: CommandEndpoint>(
        &mut self,
        cycles: u64,
        sink: &mut S,
        commands: &mut C,
    ) {
        self.apply_frequency(self.shared.frequency_hz());
        for _ in 0..cycles {
            if !self.shared.is_running() {
                break;
            }
            self.cycle(sink, commands);
        }
    }

    /// Zero the actuator and announce shutdown.
    pub fn finish<S: TelemetrySink>(&mut self, sink: &mut S) {
        let _ = self.api.set_magnet(0.0);
        sink.send_topic(
            Topic::Status,
            &frame::shutdown_frame(self.shared.loop_count()),
        );
    }

    /// Execute one full cycle including the wait for the next tick.
    pub fn cycle<S: TelemetrySink, C: CommandEndpoint>(&mut self, sink: &mut S, commands: &mut C) {
        let loop_start = Instant::now();
        let cycle_number = self.shared.loop_count() + 1;

        // ── Sensor reads ────────────────────────────────────────
        let readings = self
            .api
            .read_pos()
            .and_then(|pos| self.api.read_intensity().map(|intensity| (pos, intensity)));

        match readings {
            Err(e) => {
                // Transient sensor faults never kill the loop: report,
                // latch emergency stop, try again next cycle.
                sink.send_topic(
                    Topic::Error,
                    &frame::loop_error_frame(e.as_str(), self.shared.loop_count()),
                );
                self.shared.emergency_stop.store(true, Ordering::Release);
                self.api.emergency_stop();
            }
            Ok((position, intensity)) => {
                self.control_cycle(position, intensity, cycle_number, loop_start, sink);
            }
        }

        // ── Command drain (≤1 ms) ───────────────────────────────
        if commands.has_request() {
            if let Some(request) = commands.recv_timeout(COMMAND_POLL_TIMEOUT) {
                let response = self.handle_command(&request);
                commands.reply(&response);
            }
        }

        // ── Wait for the next tick ──────────────────────────────
        self.clock.wait_next();
        self.watchdog.reset();
    }

    /// The control portion of a cycle, after successful sensor reads.
    fn control_cycle<S: TelemetrySink>(
        &mut self,
        position: f64,
        intensity: f64,
        cycle_number: u64,
        loop_start: Instant,
        sink: &mut S,
    ) {
        // Plausibility warnings are advisory only.
        if !self.limits.is_position_plausible(position, self.chamber_radius_mm) {
            warn!(position, "implausible BPM reading");
        }
        if !self.limits.is_intensity_plausible(intensity) {
            warn!(intensity, "implausible BIC reading");
        }

        // ── Machine protection ──────────────────────────────────
        let mps_ok = self.mps.check_safety(intensity, position);
        if !mps_ok && !self.shared.emergency_stop() {
            warn!("MPS revoked beam permit, latching emergency stop");
            self.shared.emergency_stop.store(true, Ordering::Release);
            self.shared.control_enabled.store(false, Ordering::Release);
        }

        // ── Control calculation ─────────────────────────────────
        let period_s = 1.0 / self.shared.frequency_hz();
        let mut magnet_saturated = false;

        if self.shared.control_enabled() && !self.shared.emergency_stop() {
            let u = self.pid.step(
                position,
                period_s,
                self.limits.magnet_min,
                self.limits.magnet_max,
            );
            let u = self.limits.clamp(u);
            magnet_saturated = u <= self.limits.magnet_min || u >= self.limits.magnet_max;

            if let Err(e) = self.api.set_magnet(u) {
                if e.is_recoverable() {
                    warn!(error = %e, command = u, "magnet command rejected");
                } else {
                    sink.send_topic(
                        Topic::Error,
                        &frame::loop_error_frame(e.as_str(), self.shared.loop_count()),
                    );
                }
            }

            // Closed-loop plant coupling: steering pushes the beam back.
            self.api.inject_beam_offset(-self.coupling_gain * u);
        } else {
            let _ = self.api.set_magnet(0.0);
        }

        if let Some(load) = self.synthetic_load {
            std::thread::sleep(load);
        }

        // ── Timing ──────────────────────────────────────────────
        let loop_end = Instant::now();
        let missed = self.watchdog.check(loop_start, loop_end);

        let loop_time = loop_end.duration_since(loop_start);
        let loop_time_ms = loop_time.as_secs_f64() * 1e3;
        self.shared
            .last_loop_time_ms
            .store(loop_time_ms, Ordering::Relaxed);
        self.shared.max_loop_time_ms.fetch_max(loop_time_ms);

        let completed = self.shared.loop_count();
        self.running_avg_ms =
            (self.running_avg_ms * completed as f64 + loop_time_ms) / (completed + 1) as f64;
        self.shared
            .avg_loop_time_ms
            .store(self.running_avg_ms, Ordering::Relaxed);

        // ── Telemetry ───────────────────────────────────────────
        let sample = TelemetrySample {
            t_sec: loop_end.duration_since(self.start_time).as_secs_f64(),
            cycle: cycle_number,
            pos: position,
            intensity,
            magnet_current: self.api.magnet_current(),
            setpoint: self.pid.setpoint(),
            error: self.pid.last_error(),
            pid_p: self.pid.last_proportional(),
            pid_i: self.pid.last_integral(),
            pid_d: self.pid.last_derivative(),
            control_output: self.pid.last_proportional()
                + self.pid.last_integral()
                + self.pid.last_derivative(),
            deadline_miss: missed,
            magnet_saturated,
            integrator_saturated: self.pid.is_integrator_saturated(),
            loop_time_us: loop_time.as_micros().min(u32::MAX as u128) as u32,
            cpu_usage: (loop_time.as_secs_f64() / period_s).min(1.0),
        };

        let flags = CycleFlags {
            control_enabled: self.shared.control_enabled(),
            emergency_stop: self.shared.emergency_stop(),
            mps_safe: self.mps.is_beam_permitted(),
            mps_abort: self.mps.is_abort_active(),
        };

        self.history.push(sample);
        self.stats_window.accumulate(&sample);
        sink.send(&frame::telemetry_frame(&sample, &flags));

        self.shared.loop_count.store(cycle_number, Ordering::Relaxed);

        // ── Adaptive frequency reduction ────────────────────────
        if missed {
            let misses = self.shared.deadline_misses.fetch_add(1, Ordering::Relaxed) + 1;
            if misses % FREQUENCY_REDUCTION_MISS_INTERVAL == 0 {
                let old_freq = self.shared.frequency_hz();
                let new_freq = self
                    .limits
                    .clamp_frequency(old_freq * FREQUENCY_REDUCTION_FACTOR);
                if new_freq != old_freq {
                    warn!(old_freq, new_freq, "reducing loop frequency after deadline misses");
                    self.shared.frequency_hz.store(new_freq, Ordering::Relaxed);
                    self.apply_frequency(new_freq);
                    sink.send_topic(
                        Topic::Alarm,
                        &frame::frequency_reduced_frame(old_freq, new_freq),
                    );
                }
            }
        }
    }
}
