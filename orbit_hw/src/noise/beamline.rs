//! Composite noise models for beamline instrumentation.
//!
//! Each model owns a seeded [`NoiseGenerator`] and combines its primitive
//! streams into the noise signature of a specific device class.

use super::NoiseGenerator;
use std::f64::consts::PI;

/// Beam Position Monitor noise characteristics.
///
/// Combines thermal, electronics and beam-current-dependent shot noise
/// with narrowband mechanical vibration and 1/f drift.
#[derive(Debug)]
pub struct BpmNoise {
    noise: NoiseGenerator,
    /// Thermal noise level [mm].
    thermal_level: f64,
    /// Electronics noise level [mm].
    electronics_level: f64,
    /// Mechanical vibration amplitude [mm].
    vibration_amplitude: f64,
    /// Vibration frequency [Hz].
    vibration_frequency: f64,
    /// Vibration phase [rad].
    phase: f64,
}

impl BpmNoise {
    /// Construct with a noise seed (`0` = OS entropy).
    pub fn new(seed: u64) -> Self {
        Self {
            noise: NoiseGenerator::new(seed),
            thermal_level: 0.001,
            electronics_level: 0.0005,
            vibration_amplitude: 0.01,
            vibration_frequency: 50.0,
            phase: 0.0,
        }
    }

    /// One composite noise sample [mm].
    ///
    /// `beam_current_ma` scales the shot noise as `1/√I`; `dt_s` advances
    /// the vibration phase by `2π·f·dt`.
    pub fn sample(&mut self, beam_current_ma: f64, dt_s: f64) -> f64 {
        let thermal = self.noise.gaussian_fast(self.thermal_level);
        let electronics = self.noise.gaussian_fast(self.electronics_level);

        // Shot noise scales with 1/sqrt(current).
        let shot_level = 0.01 / beam_current_ma.max(1.0).sqrt();
        let shot = self.noise.gaussian_fast(shot_level);

        // Mechanical vibration: sinusoid plus 10% Gaussian jitter.
        self.phase += 2.0 * PI * self.vibration_frequency * dt_s;
        let vibration = self.vibration_amplitude * self.phase.sin()
            + self.noise.gaussian_fast(self.vibration_amplitude * 0.1);

        let drift = self.noise.pink_noise(0.002);

        thermal + electronics + shot + vibration + drift
    }

    /// Override the thermal / electronics / vibration levels [mm].
    pub fn set_levels(&mut self, thermal: f64, electronics: f64, vibration: f64) {
        self.thermal_level = thermal;
        self.electronics_level = electronics;
        self.vibration_amplitude = vibration;
    }

    /// Override the vibration frequency [Hz].
    pub fn set_vibration_frequency(&mut self, hz: f64) {
        self.vibration_frequency = hz;
    }

    /// Clear filter state and the vibration phase.
    pub fn reset(&mut self) {
        self.noise.reset();
        self.phase = 0.0;
    }
}

/// Beam Intensity Counter noise characteristics.
///
/// Poisson counting statistics over signal plus dark current, a
/// multiplicative gain term and additive electronics noise.
#[derive(Debug)]
pub struct BicNoise {
    noise: NoiseGenerator,
    /// Dark current [counts/s].
    dark_current: f64,
    /// Fractional gain variation.
    gain_variation: f64,
}

impl BicNoise {
    /// Construct with a noise seed (`0` = OS entropy).
    pub fn new(seed: u64) -> Self {
        Self {
            noise: NoiseGenerator::new(seed),
            dark_current: 10.0,
            gain_variation: 0.02,
        }
    }

    /// One noisy intensity measurement [counts/s], clamped at zero.
    pub fn sample(&mut self, true_intensity: f64) -> f64 {
        let base_counts = true_intensity + self.dark_current;
        let poisson_counts = self.noise.poisson(base_counts);

        let gain_factor = 1.0 + self.noise.gaussian_fast(self.gain_variation);
        let electronics = self.noise.gaussian_fast(base_counts.sqrt() * 0.1);

        (((poisson_counts + electronics) * gain_factor) - self.dark_current).max(0.0)
    }

    /// Set the dark current level [counts/s].
    pub fn set_dark_current(&mut self, dark: f64) {
        self.dark_current = dark;
    }

    /// Set the fractional gain variation.
    pub fn set_gain_variation(&mut self, variation: f64) {
        self.gain_variation = variation;
    }
}

/// Magnet power-supply noise characteristics.
///
/// Regulation noise proportional to the commanded current, mains-related
/// ripple, 1/f drift, and 16-bit DAC quantization over a ±10 A range.
#[derive(Debug)]
pub struct MagnetNoise {
    noise: NoiseGenerator,
    /// Fractional current regulation stability.
    current_stability: f64,
    /// Ripple amplitude as a fraction of the commanded current.
    ripple_amplitude: f64,
    /// Ripple frequency [Hz].
    ripple_frequency: f64,
    /// Ripple phase [rad].
    phase: f64,
}

/// DAC resolution of the simulated magnet power supply.
const MAGNET_DAC_BITS: u32 = 16;
/// Full-scale range of the magnet DAC [A].
const MAGNET_DAC_FULL_SCALE_A: f64 = 10.0;

impl MagnetNoise {
    /// Construct with a noise seed (`0` = OS entropy).
    pub fn new(seed: u64) -> Self {
        Self {
            noise: NoiseGenerator::new(seed),
            current_stability: 1e-5,
            ripple_amplitude: 1e-4,
            ripple_frequency: 100.0,
            phase: 0.0,
        }
    }

    /// Current error [A] for the given commanded current over `dt_s`.
    pub fn sample(&mut self, commanded_current: f64, dt_s: f64) -> f64 {
        let stability = self
            .noise
            .gaussian_fast(commanded_current.abs() * self.current_stability);

        self.phase += 2.0 * PI * self.ripple_frequency * dt_s;
        let ripple = self.ripple_amplitude * commanded_current.abs() * self.phase.sin();

        let drift = self.noise.pink_noise(commanded_current.abs() * 1e-6);

        let quantized = self.noise.quantization_noise(
            commanded_current,
            MAGNET_DAC_BITS,
            MAGNET_DAC_FULL_SCALE_A,
        );

        (quantized - commanded_current) + stability + ripple + drift
    }

    /// Set the fractional regulation stability.
    pub fn set_current_stability(&mut self, stability: f64) {
        self.current_stability = stability;
    }

    /// Set the ripple amplitude (fraction of current) and frequency [Hz].
    pub fn set_ripple(&mut self, amplitude: f64, frequency: f64) {
        self.ripple_amplitude = amplitude;
        self.ripple_frequency = frequency;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std_dev(samples: &[f64]) -> f64 {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        (samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n).sqrt()
    }

    #[test]
    fn bpm_shot_noise_shrinks_with_beam_current() {
        // Vibration off so the current-dependent term dominates.
        let mut low = BpmNoise::new(21);
        low.set_levels(0.0, 0.0, 0.0);
        let mut high = BpmNoise::new(21);
        high.set_levels(0.0, 0.0, 0.0);

        let low_samples: Vec<f64> = (0..5000).map(|_| low.sample(1.0, 0.001)).collect();
        let high_samples: Vec<f64> = (0..5000).map(|_| high.sample(1000.0, 0.001)).collect();

        assert!(
            std_dev(&high_samples) < std_dev(&low_samples),
            "shot noise must shrink with beam current"
        );
    }

    #[test]
    fn bpm_same_seed_same_stream() {
        let mut a = BpmNoise::new(9);
        let mut b = BpmNoise::new(9);
        for _ in 0..1000 {
            assert_eq!(
                a.sample(100.0, 0.001).to_bits(),
                b.sample(100.0, 0.001).to_bits()
            );
        }
    }

    #[test]
    fn bic_output_is_non_negative() {
        let mut noise = BicNoise::new(33);
        for _ in 0..2000 {
            assert!(noise.sample(0.0) >= 0.0);
            assert!(noise.sample(500.0) >= 0.0);
        }
    }

    #[test]
    fn bic_tracks_true_intensity() {
        let mut noise = BicNoise::new(44);
        let n = 5000;
        let mean = (0..n).map(|_| noise.sample(1000.0)).sum::<f64>() / n as f64;
        assert!((mean - 1000.0).abs() < 30.0, "mean {mean}");
    }

    #[test]
    fn magnet_noise_is_small_relative_to_current() {
        let mut noise = MagnetNoise::new(55);
        for _ in 0..2000 {
            let err = noise.sample(1.0, 0.001);
            assert!(err.abs() < 0.01, "error {err} too large for 1 A command");
        }
    }
}
