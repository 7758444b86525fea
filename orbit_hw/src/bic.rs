//! Beam Intensity Counter simulation.
//!
//! Models a counting detector with Poisson statistics, dark current,
//! quantum efficiency, saturation, a slowly evolving gain factor,
//! temperature dependence, nonlinearity and a calibration stage.

use crate::error::SensorError;
use crate::noise::BicNoise;
use crate::sensor::{Sensor, SensorStats};
use orbit_common::atomic::AtomicF64;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Simulated Beam Intensity Counter.
pub struct Bic {
    id: String,

    // Physical parameters.
    true_intensity: f64,
    dark_current: f64,
    conversion_factor: f64,
    integration_time_s: f64,

    // Detector characteristics.
    quantum_efficiency: f64,
    gain: f64,
    gain_stability: f64,
    saturation_level: f64,
    saturation_enabled: bool,
    linearity_error: f64,

    // Environment.
    temperature_c: f64,
    temperature_coefficient: f64,

    // Calibration.
    calibration_scale: f64,
    calibration_offset: f64,

    // Noise.
    noise: BicNoise,
    noise_enabled: bool,
    /// Slowly evolving multiplicative gain factor, bounded to [0.5, 2.0].
    gain_walk: f64,

    // Readout bookkeeping.
    last_reading: AtomicF64,
    read_count: AtomicU64,

    // Contract state.
    initialized: bool,
    last_error: Option<SensorError>,
    stats: SensorStats,
}

impl Bic {
    /// Construct a BIC with the given identifier and noise seed
    /// (`0` = OS entropy).
    pub fn new(id: impl Into<String>, noise_seed: u64) -> Self {
        Self {
            id: id.into(),
            true_intensity: 1000.0,
            dark_current: 10.0,
            conversion_factor: 1.0,
            integration_time_s: 0.001,
            quantum_efficiency: 0.8,
            gain: 1e6,
            gain_stability: 0.02,
            saturation_level: 1e8,
            saturation_enabled: true,
            linearity_error: 0.001,
            temperature_c: 20.0,
            temperature_coefficient: 0.001,
            calibration_scale: 1.0,
            calibration_offset: 0.0,
            noise: BicNoise::new(noise_seed),
            noise_enabled: true,
            gain_walk: 1.0,
            last_reading: AtomicF64::new(0.0),
            read_count: AtomicU64::new(0),
            initialized: false,
            last_error: None,
            stats: SensorStats::new(),
        }
    }

    /// Set the true beam intensity [counts/s] (simulation control).
    pub fn set_beam_intensity(&mut self, intensity: f64) {
        self.true_intensity = intensity.max(0.0);
    }

    /// True beam intensity [counts/s].
    pub fn beam_intensity(&self) -> f64 {
        self.true_intensity
    }

    /// Set the dark current level [counts/s].
    pub fn set_dark_current(&mut self, dark: f64) {
        self.dark_current = dark.max(0.0);
        self.noise.set_dark_current(self.dark_current);
    }

    /// Set the detector integration time [s], floored at 1 µs.
    pub fn set_integration_time(&mut self, time_s: f64) {
        self.integration_time_s = time_s.max(1e-6);
    }

    /// Set the quantum efficiency, clamped to [0, 1].
    pub fn set_quantum_efficiency(&mut self, efficiency: f64) {
        self.quantum_efficiency = efficiency.clamp(0.0, 1.0);
    }

    /// Set the internal gain and its fractional stability.
    pub fn set_gain(&mut self, gain: f64, stability: f64) {
        self.gain = gain.max(1.0);
        self.gain_stability = stability.max(0.0);
        self.noise.set_gain_variation(self.gain_stability);
    }

    /// Detector internal gain.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Set the saturation level [counts/s], floored at 1e3.
    pub fn set_saturation_level(&mut self, saturation: f64) {
        self.saturation_level = saturation.max(1e3);
    }

    /// Enable or disable saturation simulation.
    pub fn enable_saturation(&mut self, enable: bool) {
        self.saturation_enabled = enable;
    }

    /// Set the operating temperature [°C].
    pub fn set_temperature(&mut self, temp_c: f64) {
        self.temperature_c = temp_c;
    }

    /// Set the calibration scale and offset.
    pub fn set_calibration(&mut self, scale: f64, offset: f64) {
        self.calibration_scale = scale;
        self.calibration_offset = offset;
    }

    /// Set the conversion factor (e.g. counts/s to µA).
    pub fn set_conversion_factor(&mut self, factor: f64) {
        self.conversion_factor = factor;
    }

    /// Enable or disable noise simulation.
    pub fn enable_noise(&mut self, enable: bool) {
        self.noise_enabled = enable;
    }

    /// Set the fractional nonlinearity coefficient.
    pub fn set_linearity_error(&mut self, error: f64) {
        self.linearity_error = error.max(0.0);
    }

    /// Measurement statistics: `(read_count, last_reading, snr_estimate)`.
    pub fn measurement_stats(&self) -> (u64, f64, f64) {
        let reads = self.read_count.load(Ordering::Relaxed);
        let last = self.last_reading.load(Ordering::Relaxed);

        let signal = self.true_intensity * self.conversion_factor;
        let dark = self.dark_current * self.conversion_factor;
        let snr = if signal > 0.0 {
            signal / (signal + dark).sqrt()
        } else {
            0.0
        };

        (reads, last, snr)
    }

    /// True when the detector is within 90 % of its saturation level.
    pub fn is_saturated(&self) -> bool {
        self.saturation_enabled && self.true_intensity > self.saturation_level * 0.9
    }

    /// Most recent measurement without performing a new read.
    pub fn last_reading(&self) -> f64 {
        self.last_reading.load(Ordering::Relaxed)
    }
}

impl Sensor for Bic {
    fn read(&mut self) -> Result<f64, SensorError> {
        if !self.initialized {
            self.last_error = Some(SensorError::NotInitialized);
            return Err(SensorError::NotInitialized);
        }

        self.read_count.fetch_add(1, Ordering::Relaxed);

        // Expected counts over this integration period.
        let t_int = self.integration_time_s;
        let expected_signal = self.true_intensity * self.quantum_efficiency * t_int;
        let expected_dark = self.dark_current * t_int;
        let mut total_expected = expected_signal + expected_dark;

        if self.saturation_enabled {
            let cap = self.saturation_level * t_int;
            if total_expected > cap {
                total_expected = cap;
            }
        }

        // Back to a rate, then replace with the noisy measurement.
        let mut measured = total_expected / t_int;
        if self.noise_enabled {
            measured = self.noise.sample(measured);
        }

        measured = (measured - self.dark_current).max(0.0);

        // Evolving gain factor, random-walked within [0.5, 2.0].
        if self.noise_enabled && self.gain_stability > 0.0 {
            let step = (self.noise.sample(0.1) - 0.05) * self.gain_stability * 0.01;
            self.gain_walk = (self.gain_walk + step).clamp(0.5, 2.0);
            measured *= self.gain_walk;
        }

        measured *= 1.0 + (self.temperature_c - 20.0) * self.temperature_coefficient;

        if self.linearity_error > 0.0 {
            let normalized = measured / self.saturation_level;
            measured *= 1.0 + self.linearity_error * normalized * normalized;
        }

        measured = measured * self.calibration_scale + self.calibration_offset;

        let final_reading = measured * self.conversion_factor;

        self.last_reading.store(final_reading, Ordering::Relaxed);
        self.last_error = None;
        Ok(final_reading)
    }

    fn initialize(&mut self) -> Result<(), SensorError> {
        self.initialized = true;
        self.last_error = None;
        self.stats.reset();
        self.read_count.store(0, Ordering::Relaxed);
        self.gain_walk = 1.0;
        self.noise.set_dark_current(self.dark_current);
        self.noise.set_gain_variation(self.gain_stability);
        debug!(id = %self.id, "BIC initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        debug!(id = %self.id, "BIC shut down");
    }

    fn self_test(&mut self) -> bool {
        if !self.initialized {
            return false;
        }

        let orig_intensity = self.true_intensity;
        let orig_noise = self.noise_enabled;

        self.set_beam_intensity(1000.0);
        self.noise_enabled = false;

        let result = (|| {
            let reading1 = self.read()?;
            let reading2 = self.read()?;
            Ok::<_, SensorError>((reading1, reading2))
        })();

        self.set_beam_intensity(orig_intensity);
        self.noise_enabled = orig_noise;

        match result {
            Ok((r1, r2)) => {
                // Noiseless readings must be consistent to <1 %.
                let diff = (r1 - r2).abs();
                let avg = (r1 + r2) / 2.0;
                let relative = if avg > 0.0 { diff / avg } else { diff };
                relative < 0.01
            }
            Err(_) => false,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &'static str {
        "BIC"
    }

    fn units(&self) -> &'static str {
        "counts/s"
    }

    fn range(&self) -> (f64, f64) {
        (0.0, self.saturation_level * self.conversion_factor)
    }

    fn resolution(&self) -> f64 {
        // Counting statistics at 1 % of full scale.
        let one_percent = self.saturation_level * self.conversion_factor * 0.01;
        one_percent / one_percent.sqrt()
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn last_error(&self) -> Option<SensorError> {
        self.last_error
    }

    fn stats(&self) -> &SensorStats {
        &self.stats
    }
}
