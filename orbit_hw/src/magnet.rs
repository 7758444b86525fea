//! Steering magnet simulation.
//!
//! Discrete L/R plant with realistic power-supply behavior:
//!
//! - slew-rate limiting of the commanded current
//! - first-order settling with temperature-corrected winding resistance
//! - power supply regulation noise, ripple and DAC quantization
//! - quench protection latching a safety interlock
//! - field model with tanh saturation and a simple hysteresis branch
//! - energy-dissipation accounting
//!
//! Each `set` advances simulated time by the wall-clock interval since the
//! previous command; the quench trip zeroes the current and latches the
//! interlock so subsequent commands are rejected until explicitly reset.

use crate::actuator::{Actuator, ActuatorGate, ActuatorStats, SetResult};
use crate::error::ActuatorError;
use crate::noise::MagnetNoise;
use orbit_common::atomic::AtomicF64;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Simulated steering magnet and its power supply.
pub struct Magnet {
    id: String,

    // Electrical state.
    current_setpoint: f64,
    actual_current: AtomicF64,
    magnetic_field: AtomicF64,

    // Magnet characteristics.
    inductance_h: f64,
    resistance_ohm: f64,
    field_constant_t_per_a: f64,
    saturation_current_a: f64,
    saturation_field_t: f64,

    // Power supply characteristics.
    slew_rate_a_per_s: f64,

    // Environment.
    temperature_c: f64,
    temp_coefficient_r: f64,
    temp_coefficient_b: f64,

    // Hysteresis.
    hysteresis_width_a: f64,
    previous_current: f64,

    // Protection.
    quench_threshold: f64,
    interlock_active: bool,
    emergency_active: bool,

    // Noise.
    noise: MagnetNoise,
    noise_enabled: bool,

    // Dynamics bookkeeping.
    last_update_time: Instant,
    ramp_rate_a_per_s: f64,
    command_count: u64,
    total_energy_j: f64,

    // Contract state.
    min_value: f64,
    max_value: f64,
    max_rate: f64,
    gate: ActuatorGate,
    initialized: bool,
    last_error: Option<ActuatorError>,
    stats: ActuatorStats,
}

impl Magnet {
    /// Construct a magnet with the given identifier and noise seed
    /// (`0` = OS entropy).
    pub fn new(id: impl Into<String>, noise_seed: u64) -> Self {
        Self {
            id: id.into(),
            current_setpoint: 0.0,
            actual_current: AtomicF64::new(0.0),
            magnetic_field: AtomicF64::new(0.0),
            inductance_h: 0.1,
            resistance_ohm: 1.0,
            field_constant_t_per_a: 0.01,
            saturation_current_a: 100.0,
            saturation_field_t: 1.0,
            slew_rate_a_per_s: 10.0,
            temperature_c: 20.0,
            temp_coefficient_r: 0.001,
            temp_coefficient_b: 0.0001,
            hysteresis_width_a: 0.01,
            previous_current: 0.0,
            quench_threshold: 0.9,
            interlock_active: false,
            emergency_active: false,
            noise: MagnetNoise::new(noise_seed),
            noise_enabled: true,
            last_update_time: Instant::now(),
            ramp_rate_a_per_s: 0.0,
            command_count: 0,
            total_energy_j: 0.0,
            min_value: -50.0,
            max_value: 50.0,
            max_rate: 10.0,
            gate: ActuatorGate::new(),
            initialized: false,
            last_error: None,
            stats: ActuatorStats::new(),
        }
    }

    /// Advance the plant by `dt` seconds toward `target_amps`.
    fn step_with_dt(&mut self, target_amps: f64, dt: f64) -> Result<(), ActuatorError> {
        if self.emergency_active {
            self.last_error = Some(ActuatorError::Interlock);
            return Err(ActuatorError::Interlock);
        }
        if self.interlock_active {
            self.last_error = Some(ActuatorError::Interlock);
            return Err(ActuatorError::Interlock);
        }

        self.command_count += 1;

        // Slew-rate limit the commanded step.
        let actual = self.actual_current.load(Ordering::Relaxed);
        let mut commanded = target_amps;
        if dt > 0.0 {
            let max_change = self.slew_rate_a_per_s * dt;
            let requested_change = target_amps - actual;
            if requested_change.abs() > max_change {
                let limited = max_change.copysign(requested_change);
                commanded = actual + limited;
                self.ramp_rate_a_per_s = limited / dt;
            } else {
                self.ramp_rate_a_per_s = 0.0;
            }
        } else {
            self.ramp_rate_a_per_s = 0.0;
        }

        self.current_setpoint = commanded;

        // First-order L/R settling with temperature-corrected resistance.
        let r_eff = self.effective_resistance();
        let alpha = dt / (self.inductance_h / r_eff + dt);
        let mut new_current = alpha * commanded + (1.0 - alpha) * actual;

        if self.noise_enabled {
            new_current += self.noise.sample(new_current, dt);
        }

        // Quench protection: trip the interlock and dump the current.
        if new_current.abs() / self.saturation_current_a > self.quench_threshold {
            warn!(
                id = %self.id,
                current = new_current,
                "quench threshold exceeded, dumping current and latching interlock"
            );
            self.interlock_active = true;
            new_current = 0.0;
        }

        self.actual_current.store(new_current, Ordering::Relaxed);
        self.update_magnetic_field(new_current);

        self.total_energy_j += new_current * new_current * r_eff * dt;

        self.last_error = None;
        Ok(())
    }

    /// Winding resistance at the current operating temperature [Ω].
    pub fn effective_resistance(&self) -> f64 {
        self.resistance_ohm * (1.0 + (self.temperature_c - 20.0) * self.temp_coefficient_r)
    }

    fn update_magnetic_field(&mut self, current: f64) {
        // Linear below 0.9·I_sat, tanh-saturated above.
        let mut field = if current.abs() < self.saturation_current_a * 0.9 {
            current * self.field_constant_t_per_a
        } else {
            self.saturation_field_t * (current / self.saturation_current_a).tanh()
        };

        // Hysteresis branch: lag on ascending current, lead on descending.
        if self.hysteresis_width_a > 0.0 {
            let delta = current - self.previous_current;
            if delta > 0.0 {
                field -= self.hysteresis_width_a * 0.5;
            } else if delta < 0.0 {
                field += self.hysteresis_width_a * 0.5;
            }
        }
        self.previous_current = current;

        field *= 1.0 + (self.temperature_c - 20.0) * self.temp_coefficient_b;

        self.magnetic_field.store(field, Ordering::Relaxed);
    }

    /// Current magnetic field [T].
    pub fn magnetic_field(&self) -> f64 {
        self.magnetic_field.load(Ordering::Relaxed)
    }

    /// Set inductance [H], resistance [Ω] and field constant [T/A].
    pub fn set_magnet_parameters(&mut self, inductance_h: f64, resistance_ohm: f64, field_constant: f64) {
        self.inductance_h = inductance_h.max(1e-6);
        self.resistance_ohm = resistance_ohm.max(1e-3);
        self.field_constant_t_per_a = field_constant;
    }

    /// Set saturation current [A] and field [T].
    pub fn set_saturation(&mut self, sat_current_a: f64, sat_field_t: f64) {
        self.saturation_current_a = sat_current_a.max(1.0);
        self.saturation_field_t = sat_field_t.max(0.01);
    }

    /// Set the slew-rate limit [A/s]; also used as the contract rate limit.
    pub fn set_slew_rate_limit(&mut self, rate_a_per_s: f64) {
        self.slew_rate_a_per_s = rate_a_per_s.max(0.1);
        self.max_rate = self.slew_rate_a_per_s;
    }

    /// Set the operating temperature [°C].
    pub fn set_temperature(&mut self, temp_c: f64) {
        self.temperature_c = temp_c;
    }

    /// Set the hysteresis loop width [A].
    pub fn set_hysteresis(&mut self, width_a: f64) {
        self.hysteresis_width_a = width_a.max(0.0);
    }

    /// Set the quench threshold as a fraction of the saturation current.
    pub fn set_quench_threshold(&mut self, fraction: f64) {
        self.quench_threshold = fraction.clamp(0.0, 1.0);
    }

    /// Enable or disable noise simulation.
    pub fn enable_noise(&mut self, enable: bool) {
        self.noise_enabled = enable;
    }

    /// Clear the emergency-stop latch.
    pub fn reset_emergency_stop(&mut self) {
        self.emergency_active = false;
        debug!(id = %self.id, "emergency stop cleared");
    }

    /// Clear the quench interlock latch.
    pub fn reset_interlock(&mut self) {
        self.interlock_active = false;
        debug!(id = %self.id, "interlock cleared");
    }

    /// True while the quench interlock is latched.
    pub fn is_interlock_active(&self) -> bool {
        self.interlock_active
    }

    /// True while the emergency-stop latch is set.
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_active
    }

    /// True while the current is actively slewing (>0.01 A/s).
    pub fn is_ramping(&self) -> bool {
        self.ramp_rate_a_per_s.abs() > 0.01
    }

    /// Current slew rate [A/s].
    pub fn ramp_rate(&self) -> f64 {
        self.ramp_rate_a_per_s
    }

    /// Total energy dissipated in the winding [J].
    pub fn total_energy_dissipated(&self) -> f64 {
        self.total_energy_j
    }

    /// Instantaneous dissipated power [W].
    pub fn power(&self) -> f64 {
        let current = self.actual_current.load(Ordering::Relaxed);
        current * current * self.effective_resistance()
    }

    /// L/R settling time constant at the operating temperature [s].
    pub fn time_constant(&self) -> f64 {
        self.inductance_h / self.effective_resistance()
    }

    /// Commands issued since initialization.
    pub fn command_count(&self) -> u64 {
        self.command_count
    }
}

impl Actuator for Magnet {
    fn set(&mut self, current_amps: f64) -> Result<(), ActuatorError> {
        if self.emergency_active || self.interlock_active {
            self.last_error = Some(ActuatorError::Interlock);
            return Err(ActuatorError::Interlock);
        }
        let now = Instant::now();
        let dt = now.duration_since(self.last_update_time).as_secs_f64();
        self.last_update_time = now;
        self.step_with_dt(current_amps, dt)
    }

    fn set_with_result(&mut self, value: f64) -> SetResult {
        let start = Instant::now();

        if let Err(e) = self.gate.precheck(
            self.initialized,
            (self.min_value, self.max_value),
            self.max_rate,
            value,
            start,
        ) {
            self.stats.record_error(e);
            self.last_error = Some(e);
            return SetResult::rejected(value, self.get(), e);
        }

        match self.set(value) {
            Ok(()) => {
                let elapsed = start.elapsed();
                self.gate.commit(value, start);
                self.stats.record_success(value, elapsed);
                SetResult::accepted(value, self.get(), elapsed.as_secs_f64() * 1e6)
            }
            Err(e) => {
                self.stats.record_error(e);
                SetResult::rejected(value, self.get(), e)
            }
        }
    }

    fn get(&self) -> f64 {
        self.actual_current.load(Ordering::Relaxed)
    }

    fn target(&self) -> f64 {
        self.gate.target()
    }

    fn limits(&self) -> (f64, f64) {
        (self.min_value, self.max_value)
    }

    fn set_limits(&mut self, min: f64, max: f64) {
        self.min_value = min;
        self.max_value = max;
    }

    fn max_rate(&self) -> f64 {
        self.max_rate
    }

    fn set_max_rate(&mut self, rate: f64) {
        self.max_rate = rate;
    }

    fn initialize(&mut self) -> Result<(), ActuatorError> {
        self.current_setpoint = 0.0;
        self.actual_current.store(0.0, Ordering::Relaxed);
        self.magnetic_field.store(0.0, Ordering::Relaxed);
        self.previous_current = 0.0;
        self.interlock_active = false;
        self.emergency_active = false;
        self.command_count = 0;
        self.total_energy_j = 0.0;
        self.ramp_rate_a_per_s = 0.0;
        self.last_update_time = Instant::now();
        self.gate.reset(0.0);
        self.stats.reset();
        self.last_error = None;
        self.initialized = true;
        debug!(id = %self.id, "magnet initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        // Best effort: park at zero current.
        let _ = self.set(0.0);
        self.initialized = false;
        debug!(id = %self.id, "magnet shut down");
    }

    fn self_test(&mut self) -> bool {
        if !self.initialized || self.emergency_active || self.interlock_active {
            return false;
        }
        if self.inductance_h <= 0.0 || self.resistance_ohm <= 0.0 {
            return false;
        }

        let orig_noise = self.noise_enabled;
        self.noise_enabled = false;

        // Drive toward a nearby target: the response must move toward it
        // monotonically (first-order plant, no overshoot).
        let c0 = self.get();
        let target = c0 + 0.5;
        std::thread::sleep(Duration::from_millis(5));
        let step_up_ok = self.set(target).is_ok();
        let c1 = self.get();
        let approaches = c1 >= c0 - 1e-9 && c1 <= target + 1e-9;

        // And back again.
        std::thread::sleep(Duration::from_millis(5));
        let step_down_ok = self.set(c0).is_ok();
        let c2 = self.get();
        let returns = c2 <= c1 + 1e-9;

        self.noise_enabled = orig_noise;

        step_up_ok && step_down_ok && approaches && returns
    }

    fn emergency_stop(&mut self) {
        self.emergency_active = true;
        self.current_setpoint = 0.0;
        self.actual_current.store(0.0, Ordering::Relaxed);
        self.magnetic_field.store(0.0, Ordering::Relaxed);
        self.gate.reset(0.0);
        warn!(id = %self.id, "magnet emergency stop latched");
    }

    fn reset_emergency(&mut self) {
        self.reset_emergency_stop();
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &'static str {
        "Magnet"
    }

    fn units(&self) -> &'static str {
        "A"
    }

    fn resolution(&self) -> f64 {
        0.001 // 1 mA
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn last_error(&self) -> Option<ActuatorError> {
        self.last_error
    }

    fn stats(&self) -> &ActuatorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_magnet() -> Magnet {
        let mut mag = Magnet::new("MAG_TEST", 1);
        mag.initialize().unwrap();
        mag.enable_noise(false);
        mag
    }

    #[test]
    fn set_before_initialize_still_steps_plant() {
        // The raw device path has no initialization gate (that belongs to
        // set_with_result); it simply advances the plant.
        let mut mag = Magnet::new("MAG_RAW", 1);
        mag.enable_noise(false);
        assert!(mag.set(1.0).is_ok());
    }

    #[test]
    fn set_with_result_requires_initialization() {
        let mut mag = Magnet::new("MAG_01", 1);
        let r = mag.set_with_result(1.0);
        assert!(!r.success);
        assert_eq!(r.error, Some(ActuatorError::NotInitialized));
    }

    #[test]
    fn first_order_response_approaches_target() {
        let mut mag = quiet_magnet();
        mag.set_slew_rate_limit(1e6);
        // τ = L/R = 0.1 s; run 1 s of 1 ms steps.
        for _ in 0..1000 {
            mag.step_with_dt(1.0, 0.001).unwrap();
        }
        let current = mag.get();
        assert!((current - 1.0).abs() < 0.01, "current {current}");
    }

    #[test]
    fn slew_rate_limits_step_size() {
        let mut mag = quiet_magnet();
        mag.set_slew_rate_limit(1.0); // 1 A/s
        mag.step_with_dt(10.0, 0.001).unwrap();
        // Commanded change limited to 1 mA for this step.
        assert!((mag.current_setpoint - 0.001).abs() < 1e-12);
        assert!(mag.is_ramping());
        assert!((mag.ramp_rate() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quench_latches_interlock_and_dumps_current() {
        let mut mag = quiet_magnet();
        mag.set_saturation(1.0, 1.0); // quench above 0.9 A
        mag.set_slew_rate_limit(1e6);

        // Drive hard into the quench region.
        let mut quenched = false;
        for _ in 0..200 {
            if mag.step_with_dt(5.0, 0.01).is_err() {
                quenched = true;
                break;
            }
        }
        assert!(quenched || mag.is_interlock_active());
        assert_eq!(mag.get(), 0.0);
        assert_eq!(mag.magnetic_field(), 0.0);

        // Commands rejected until the interlock is reset.
        assert_eq!(mag.set(0.1), Err(ActuatorError::Interlock));
        mag.reset_interlock();
        assert!(mag.set(0.1).is_ok());
    }

    #[test]
    fn emergency_stop_zeroes_and_latches() {
        let mut mag = quiet_magnet();
        mag.set_slew_rate_limit(1e6);
        for _ in 0..100 {
            mag.step_with_dt(1.0, 0.01).unwrap();
        }
        assert!(mag.get() > 0.5);

        mag.emergency_stop();
        assert_eq!(mag.get(), 0.0);
        assert_eq!(mag.magnetic_field(), 0.0);
        assert!(mag.is_emergency_stopped());

        // Subsequent sets are rejected and the reading stays at zero.
        assert_eq!(mag.set(1.0), Err(ActuatorError::Interlock));
        assert_eq!(mag.get(), 0.0);

        mag.reset_emergency_stop();
        assert!(mag.set(0.5).is_ok());
    }

    #[test]
    fn hysteresis_branch_signs() {
        let mut mag = quiet_magnet();
        mag.set_slew_rate_limit(1e6);
        mag.set_hysteresis(0.01);

        // Ascending: field lags (subtract half width).
        mag.step_with_dt(1.0, 0.01).unwrap();
        let ascending = mag.magnetic_field();
        let linear = mag.get() * 0.01;
        assert!(ascending < linear);

        // Descending: field leads (add half width).
        mag.step_with_dt(0.0, 0.01).unwrap();
        let descending = mag.magnetic_field();
        let linear = mag.get() * 0.01;
        assert!(descending > linear);
    }

    #[test]
    fn field_saturates_at_high_current() {
        let mut mag = quiet_magnet();
        mag.set_hysteresis(0.0);
        mag.set_saturation(10.0, 0.5);
        mag.set_quench_threshold(1.0);
        mag.set_slew_rate_limit(1e6);

        for _ in 0..2000 {
            mag.step_with_dt(9.99, 0.01).unwrap();
        }
        let field = mag.magnetic_field();
        let tanh_field = 0.5 * (mag.get() / 10.0).tanh();
        assert!((field - tanh_field).abs() < 1e-9);
        assert!(field < 0.5);
    }

    #[test]
    fn energy_accumulates_with_current() {
        let mut mag = quiet_magnet();
        mag.set_slew_rate_limit(1e6);
        assert_eq!(mag.total_energy_dissipated(), 0.0);
        for _ in 0..100 {
            mag.step_with_dt(1.0, 0.01).unwrap();
        }
        let energy = mag.total_energy_dissipated();
        assert!(energy > 0.0);
        // Roughly I²R·t once settled; generous bounds.
        assert!(energy < 2.0);
        assert!(mag.power() > 0.0);
    }

    #[test]
    fn temperature_raises_resistance() {
        let mut mag = quiet_magnet();
        let cold = mag.effective_resistance();
        mag.set_temperature(120.0);
        let hot = mag.effective_resistance();
        assert!((cold - 1.0).abs() < 1e-12);
        assert!((hot - 1.1).abs() < 1e-12);
        assert!(mag.time_constant() < 0.1);
    }

    #[test]
    fn set_with_result_tracks_target() {
        let mut mag = quiet_magnet();
        mag.set_max_rate(1e9);
        let r = mag.set_with_result(0.5);
        assert!(r.success);
        assert_eq!(r.commanded_value, 0.5);
        assert_eq!(mag.target(), 0.5);
        assert_eq!(mag.stats().successful_commands(), 1);
    }

    #[test]
    fn set_with_result_rejects_out_of_range() {
        let mut mag = quiet_magnet();
        let r = mag.set_with_result(100.0);
        assert!(!r.success);
        assert_eq!(r.error, Some(ActuatorError::OutOfRange));
        assert_eq!(mag.stats().range_violations(), 1);
    }

    #[test]
    fn self_test_on_healthy_magnet() {
        let mut mag = quiet_magnet();
        assert!(mag.self_test());
    }

    #[test]
    fn initialize_resets_protection_and_counters() {
        let mut mag = quiet_magnet();
        mag.set_saturation(1.0, 1.0);
        mag.set_slew_rate_limit(1e6);
        for _ in 0..200 {
            let _ = mag.step_with_dt(5.0, 0.01);
        }
        assert!(mag.is_interlock_active());

        mag.initialize().unwrap();
        assert!(!mag.is_interlock_active());
        assert_eq!(mag.command_count(), 0);
        assert_eq!(mag.total_energy_dissipated(), 0.0);
        assert_eq!(mag.get(), 0.0);
    }
}
