//! Control unit configuration: typed TOML sections with validation.
//!
//! Every section has complete defaults, so an empty file (or no file at
//! all) yields the stock 1 kHz simulation setup.

use orbit_common::config::{ConfigError, ConfigLoader, SharedConfig};
use orbit_common::consts::{MAX_LOOP_FREQUENCY_HZ, MIN_LOOP_FREQUENCY_HZ};
use serde::Deserialize;
use std::path::Path;

/// Top-level control unit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CuConfig {
    /// Service identity and log level.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Loop timing and coupling.
    #[serde(default, rename = "loop")]
    pub control_loop: LoopSection,
    /// PID gains and integrator bounds.
    #[serde(default)]
    pub pid: PidSection,
    /// Steering magnet limits and simulation seed.
    #[serde(default)]
    pub magnet: MagnetSection,
    /// BPM simulation parameters.
    #[serde(default)]
    pub bpm: BpmSection,
    /// BIC simulation parameters.
    #[serde(default)]
    pub bic: BicSection,
    /// Machine protection thresholds.
    #[serde(default)]
    pub mps: MpsSection,
}

impl ConfigLoader for CuConfig {}

/// Loop timing and plant-coupling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    /// Initial loop frequency [Hz].
    pub frequency_hz: f64,
    /// Start with the control calculation enabled.
    pub control_enabled: bool,
    /// Beam offset injected per ampere of steering output [mm/A].
    pub coupling_gain: f64,
    /// Telemetry history ring depth [samples].
    pub history_depth: usize,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            control_enabled: true,
            coupling_gain: 0.4,
            history_depth: 4096,
        }
    }
}

/// PID controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PidSection {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Initial position setpoint [mm].
    pub setpoint: f64,
    /// Integrator lower bound.
    pub integ_min: f64,
    /// Integrator upper bound.
    pub integ_max: f64,
}

impl Default for PidSection {
    fn default() -> Self {
        Self {
            kp: 0.6,
            ki: 0.05,
            kd: 0.0,
            setpoint: 0.0,
            integ_min: -10.0,
            integ_max: 10.0,
        }
    }
}

/// Steering magnet parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MagnetSection {
    /// Loop-level minimum current command [A].
    pub min_current_a: f64,
    /// Loop-level maximum current command [A].
    pub max_current_a: f64,
    /// Power supply slew-rate limit [A/s].
    pub slew_rate_a_per_s: f64,
    /// Noise seed (0 = OS entropy).
    pub noise_seed: u64,
    /// Enable power-supply noise simulation.
    pub noise_enabled: bool,
}

impl Default for MagnetSection {
    fn default() -> Self {
        Self {
            min_current_a: -2.0,
            max_current_a: 2.0,
            slew_rate_a_per_s: 10.0,
            noise_seed: 0,
            noise_enabled: true,
        }
    }
}

/// BPM simulation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BpmSection {
    /// Noise seed (0 = OS entropy).
    pub noise_seed: u64,
    /// Enable noise simulation.
    pub noise_enabled: bool,
    /// Simulated beam current [mA].
    pub beam_current_ma: f64,
    /// Initial horizontal beam offset [mm].
    pub initial_offset_mm: f64,
    /// Chamber radius [mm].
    pub chamber_radius_mm: f64,
}

impl Default for BpmSection {
    fn default() -> Self {
        Self {
            noise_seed: 0,
            noise_enabled: true,
            beam_current_ma: 100.0,
            initial_offset_mm: 0.0,
            chamber_radius_mm: 10.0,
        }
    }
}

/// BIC simulation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BicSection {
    /// Noise seed (0 = OS entropy).
    pub noise_seed: u64,
    /// Enable noise simulation.
    pub noise_enabled: bool,
    /// True beam intensity [counts/s].
    pub true_intensity: f64,
    /// Dark current [counts/s].
    pub dark_current: f64,
}

impl Default for BicSection {
    fn default() -> Self {
        Self {
            noise_seed: 0,
            noise_enabled: true,
            true_intensity: 1000.0,
            dark_current: 10.0,
        }
    }
}

/// Machine protection thresholds applied to every BLM.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MpsSection {
    /// Per-monitor warning threshold [Gy/s].
    pub warning_threshold: f64,
    /// Per-monitor abort threshold [Gy/s].
    pub abort_threshold: f64,
}

impl Default for MpsSection {
    fn default() -> Self {
        Self {
            warning_threshold: 1e-6,
            abort_threshold: 1e-5,
        }
    }
}

impl CuConfig {
    /// Semantic validation across all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = self.control_loop.frequency_hz;
        if !(MIN_LOOP_FREQUENCY_HZ..=MAX_LOOP_FREQUENCY_HZ).contains(&f) {
            return Err(ConfigError::ValidationError(format!(
                "loop.frequency_hz {f} outside [{MIN_LOOP_FREQUENCY_HZ}, {MAX_LOOP_FREQUENCY_HZ}]"
            )));
        }
        if self.control_loop.history_depth == 0 {
            return Err(ConfigError::ValidationError(
                "loop.history_depth must be non-zero".to_string(),
            ));
        }
        if self.magnet.min_current_a >= self.magnet.max_current_a {
            return Err(ConfigError::ValidationError(
                "magnet.min_current_a must be below magnet.max_current_a".to_string(),
            ));
        }
        if self.magnet.slew_rate_a_per_s <= 0.0 {
            return Err(ConfigError::ValidationError(
                "magnet.slew_rate_a_per_s must be positive".to_string(),
            ));
        }
        if self.pid.integ_min >= self.pid.integ_max {
            return Err(ConfigError::ValidationError(
                "pid.integ_min must be below pid.integ_max".to_string(),
            ));
        }
        if self.mps.warning_threshold >= self.mps.abort_threshold {
            return Err(ConfigError::ValidationError(
                "mps.warning_threshold must be below mps.abort_threshold".to_string(),
            ));
        }
        if self.bpm.chamber_radius_mm <= 0.0 {
            return Err(ConfigError::ValidationError(
                "bpm.chamber_radius_mm must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate the control unit configuration.
pub fn load_config(path: &Path) -> Result<CuConfig, ConfigError> {
    let config = CuConfig::load(path)?;
    config.validate()?;
    Ok(config)
}
