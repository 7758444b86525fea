//! Beam Position Monitor simulation.
//!
//! Models a 4-electrode BPM with position calculation from a rotated
//! electrode frame, calibration scaling and offsets, temperature drift,
//! beam-current-dependent noise and electrode-mismatch nonlinearity.
//!
//! The true beam position is held in atomic cells: the control loop reads
//! and writes it (closed-loop coupling), while observer threads may read
//! it concurrently without locks.

use crate::error::SensorError;
use crate::noise::BpmNoise;
use crate::sensor::{Sensor, SensorStats};
use orbit_common::atomic::AtomicF64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// Which transverse axis the BPM reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadoutAxis {
    /// Horizontal plane.
    #[default]
    X,
    /// Vertical plane.
    Y,
}

/// Access to the simulated beam state for closed-loop plant coupling.
///
/// The orchestrator is the single writer within a cycle; external readers
/// observe the position through atomic loads.
pub trait BeamPlant {
    /// True beam position `(x, y)` [mm].
    fn beam_position(&self) -> (f64, f64);

    /// Overwrite the true beam position [mm].
    fn set_beam_position(&self, x_mm: f64, y_mm: f64);
}

/// Simulated Beam Position Monitor.
pub struct Bpm {
    id: String,

    // Simulated beam state (shared with the plant-coupling path).
    beam_x: AtomicF64,
    beam_y: AtomicF64,
    beam_current_ma: AtomicF64,
    chamber_radius_mm: f64,

    // Calibration.
    sensitivity_x: f64,
    sensitivity_y: f64,
    offset_x: f64,
    offset_y: f64,
    rotation_rad: f64,
    readout_axis: ReadoutAxis,

    // Environment.
    temperature_c: f64,
    temperature_coefficient: f64,
    electrode_gain_mismatch: f64,

    // Noise.
    noise: BpmNoise,
    noise_enabled: bool,

    // Readout bookkeeping.
    last_read_time: Instant,
    last_reading: AtomicF64,
    read_count: AtomicU64,

    // Contract state.
    initialized: bool,
    last_error: Option<SensorError>,
    stats: SensorStats,
}

impl Bpm {
    /// Construct a BPM with the given identifier and noise seed
    /// (`0` = OS entropy).
    pub fn new(id: impl Into<String>, noise_seed: u64) -> Self {
        Self {
            id: id.into(),
            beam_x: AtomicF64::new(0.0),
            beam_y: AtomicF64::new(0.0),
            beam_current_ma: AtomicF64::new(100.0),
            chamber_radius_mm: 10.0,
            sensitivity_x: 1.0,
            sensitivity_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation_rad: 0.0,
            readout_axis: ReadoutAxis::X,
            temperature_c: 20.0,
            temperature_coefficient: 0.001,
            electrode_gain_mismatch: 0.02,
            noise: BpmNoise::new(noise_seed),
            noise_enabled: true,
            last_read_time: Instant::now(),
            last_reading: AtomicF64::new(0.0),
            read_count: AtomicU64::new(0),
            initialized: false,
            last_error: None,
            stats: SensorStats::new(),
        }
    }

    /// Set the simulated beam current [mA] (drives shot noise).
    pub fn set_beam_current(&self, current_ma: f64) {
        self.beam_current_ma.store(current_ma, Ordering::Relaxed);
    }

    /// Simulated beam current [mA].
    pub fn beam_current(&self) -> f64 {
        self.beam_current_ma.load(Ordering::Relaxed)
    }

    /// Set calibration: per-axis sensitivities and offsets plus a frame
    /// rotation given in degrees.
    pub fn set_calibration(
        &mut self,
        sens_x: f64,
        sens_y: f64,
        off_x: f64,
        off_y: f64,
        rotation_deg: f64,
    ) {
        self.sensitivity_x = sens_x;
        self.sensitivity_y = sens_y;
        self.offset_x = off_x;
        self.offset_y = off_y;
        self.rotation_rad = rotation_deg.to_radians();
    }

    /// Calibration as `(sens_x, sens_y, off_x, off_y, rotation_deg)`.
    pub fn calibration(&self) -> (f64, f64, f64, f64, f64) {
        (
            self.sensitivity_x,
            self.sensitivity_y,
            self.offset_x,
            self.offset_y,
            self.rotation_rad.to_degrees(),
        )
    }

    /// Select the readout axis.
    pub fn set_readout_axis(&mut self, axis: ReadoutAxis) {
        self.readout_axis = axis;
    }

    /// Currently selected readout axis.
    pub fn readout_axis(&self) -> ReadoutAxis {
        self.readout_axis
    }

    /// Set the operating temperature [°C].
    pub fn set_temperature(&mut self, temp_c: f64) {
        self.temperature_c = temp_c;
    }

    /// Set the chamber radius [mm] used for range metadata and the
    /// nonlinearity normalization.
    pub fn set_chamber_radius(&mut self, radius_mm: f64) {
        self.chamber_radius_mm = radius_mm;
    }

    /// Set the electrode gain mismatch fraction.
    pub fn set_electrode_gain_mismatch(&mut self, mismatch: f64) {
        self.electrode_gain_mismatch = mismatch;
    }

    /// Enable or disable noise simulation.
    pub fn enable_noise(&mut self, enable: bool) {
        self.noise_enabled = enable;
    }

    /// Number of reads since initialization.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Most recent measurement without performing a new read [mm].
    pub fn last_reading(&self) -> f64 {
        self.last_reading.load(Ordering::Relaxed)
    }
}

impl BeamPlant for Bpm {
    fn beam_position(&self) -> (f64, f64) {
        (
            self.beam_x.load(Ordering::Relaxed),
            self.beam_y.load(Ordering::Relaxed),
        )
    }

    fn set_beam_position(&self, x_mm: f64, y_mm: f64) {
        self.beam_x.store(x_mm, Ordering::Relaxed);
        self.beam_y.store(y_mm, Ordering::Relaxed);
    }
}

impl Sensor for Bpm {
    fn read(&mut self) -> Result<f64, SensorError> {
        if !self.initialized {
            self.last_error = Some(SensorError::NotInitialized);
            return Err(SensorError::NotInitialized);
        }

        self.read_count.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let dt = now.duration_since(self.last_read_time).as_secs_f64();
        self.last_read_time = now;

        let (true_x, true_y) = self.beam_position();

        // Rotate into the electrode frame.
        let (sin, cos) = self.rotation_rad.sin_cos();
        let rotated_x = true_x * cos - true_y * sin;
        let rotated_y = true_x * sin + true_y * cos;

        let (true_pos, sensitivity, offset) = match self.readout_axis {
            ReadoutAxis::X => (rotated_x, self.sensitivity_x, self.offset_x),
            ReadoutAxis::Y => (rotated_y, self.sensitivity_y, self.offset_y),
        };

        let mut measured = true_pos * sensitivity + offset;

        measured += (self.temperature_c - 20.0) * self.temperature_coefficient;

        if self.noise_enabled {
            let current = self.beam_current_ma.load(Ordering::Relaxed);
            measured += self.noise.sample(current, dt);
        }

        // Electrode mismatch: quadratic nonlinearity growing toward the
        // chamber wall, applied in the direction of the displacement.
        if self.electrode_gain_mismatch > 0.0 {
            let normalized = measured / self.chamber_radius_mm;
            measured += self.electrode_gain_mismatch * normalized * normalized * measured.signum();
        }

        self.last_reading.store(measured, Ordering::Relaxed);
        self.last_error = None;
        Ok(measured)
    }

    fn initialize(&mut self) -> Result<(), SensorError> {
        self.initialized = true;
        self.last_error = None;
        self.stats.reset();
        self.read_count.store(0, Ordering::Relaxed);
        self.last_read_time = Instant::now();
        self.noise.set_levels(0.001, 0.0005, 0.01);
        debug!(id = %self.id, "BPM initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        debug!(id = %self.id, "BPM shut down");
    }

    fn self_test(&mut self) -> bool {
        if !self.initialized {
            return false;
        }

        // Calibration sanity.
        if self.sensitivity_x <= 0.1 || self.sensitivity_x >= 10.0 {
            return false;
        }
        if self.sensitivity_y <= 0.1 || self.sensitivity_y >= 10.0 {
            return false;
        }

        // Known-position readback with noise disabled.
        let (orig_x, orig_y) = self.beam_position();
        let orig_axis = self.readout_axis;
        let orig_noise = self.noise_enabled;

        self.set_beam_position(1.0, 0.0);
        self.readout_axis = ReadoutAxis::X;
        self.noise_enabled = false;

        let result = self.read();

        self.set_beam_position(orig_x, orig_y);
        self.readout_axis = orig_axis;
        self.noise_enabled = orig_noise;

        match result {
            // Allow for calibration offset.
            Ok(reading) => (reading - 1.0).abs() < 0.5,
            Err(_) => false,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &'static str {
        "BPM"
    }

    fn units(&self) -> &'static str {
        "mm"
    }

    fn range(&self) -> (f64, f64) {
        (-self.chamber_radius_mm, self.chamber_radius_mm)
    }

    fn resolution(&self) -> f64 {
        0.001 // 1 µm
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
