//! Deterministic noise generation for simulated instrumentation.
//!
//! [`NoiseGenerator`] provides the noise types found in beamline
//! instrumentation:
//!
//! - Gaussian white noise (thermal, electronic)
//! - Poisson noise (particle counting statistics)
//! - 1/f pink noise (long-term drift)
//! - Brown noise (random-walk drift)
//! - Quantization noise (DAC/ADC effects)
//!
//! Every stream is keyed by a 64-bit seed; for a fixed non-zero seed the
//! entire sequence is reproducible bit-for-bit. Seed zero draws fresh OS
//! entropy. Designed for kHz-rate operation with no allocation per sample.

pub mod beamline;

pub use beamline::{BicNoise, BpmNoise, MagnetNoise};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Pink-noise recursive filter order (Paul Kellett refined form).
const PINK_TAPS: usize = 7;

/// Seeded pseudo-random noise source.
#[derive(Debug)]
pub struct NoiseGenerator {
    rng: StdRng,
    /// Pink noise filter state.
    pink: [f64; PINK_TAPS],
    /// Brown noise integrator state.
    brown: f64,
    /// Cached second Box–Muller output (unit variance).
    spare: Option<f64>,
    /// Total samples generated.
    samples: u64,
}

impl NoiseGenerator {
    /// Construct with a seed; `0` draws OS entropy instead.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self {
            rng,
            pink: [0.0; PINK_TAPS],
            brown: 0.0,
            spare: None,
            samples: 0,
        }
    }

    /// Gaussian white noise with the given mean and standard deviation.
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        self.samples += 1;
        let n: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * n
    }

    /// Zero-mean Gaussian noise via Box–Muller with a one-sample cache.
    ///
    /// Generates pairs; the second sample is cached at unit variance and
    /// scaled by the caller's `std_dev` on the next call.
    pub fn gaussian_fast(&mut self, std_dev: f64) -> f64 {
        self.samples += 1;

        if let Some(cached) = self.spare.take() {
            return cached * std_dev;
        }

        // Map [0,1) to (0,1] so the log argument is never zero.
        let u = 1.0 - self.rng.gen::<f64>();
        let v: f64 = self.rng.gen();
        let r = (-2.0 * u.ln()).sqrt();
        let theta = 2.0 * PI * v;

        self.spare = Some(r * theta.cos());
        std_dev * r * theta.sin()
    }

    /// Poisson-distributed count for the given mean.
    ///
    /// Knuth inversion below a mean of 30; Gaussian approximation
    /// (clamped at zero) above.
    pub fn poisson(&mut self, mean: f64) -> f64 {
        self.samples += 1;

        if mean < 30.0 {
            let limit = (-mean).exp();
            let mut product: f64 = self.rng.gen();
            let mut count = 0u64;
            while product > limit {
                count += 1;
                product *= self.rng.gen::<f64>();
            }
            count as f64
        } else {
            let n: f64 = self.rng.sample(StandardNormal);
            (mean + mean.sqrt() * n).max(0.0)
        }
    }

    /// Uniformly distributed value in `[min, max)`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        self.samples += 1;
        min + (max - min) * self.rng.gen::<f64>()
    }

    /// Exponentially distributed value with the given rate.
    pub fn exponential(&mut self, rate: f64) -> f64 {
        self.samples += 1;
        let u = 1.0 - self.rng.gen::<f64>();
        -u.ln() / rate
    }

    /// Pink (1/f) noise sample at the given amplitude.
    ///
    /// Paul Kellett's refined recursive filter over Gaussian white noise.
    pub fn pink_noise(&mut self, amplitude: f64) -> f64 {
        self.samples += 1;

        let white = self.gaussian_fast(1.0);

        self.pink[0] = 0.99886 * self.pink[0] + white * 0.0555179;
        self.pink[1] = 0.99332 * self.pink[1] + white * 0.0750759;
        self.pink[2] = 0.96900 * self.pink[2] + white * 0.1538520;
        self.pink[3] = 0.86650 * self.pink[3] + white * 0.3104856;
        self.pink[4] = 0.55000 * self.pink[4] + white * 0.5329522;
        self.pink[5] = -0.7616 * self.pink[5] - white * 0.0168980;

        let pink = self.pink[0]
            + self.pink[1]
            + self.pink[2]
            + self.pink[3]
            + self.pink[4]
            + self.pink[5]
            + self.pink[6]
            + white * 0.5362;

        self.pink[6] = white * 0.115926;

        pink * amplitude * 0.05
    }

    /// Brown (random-walk) noise: integrated Gaussian steps.
    pub fn brown_noise(&mut self, step_size: f64) -> f64 {
        self.samples += 1;
        self.brown += self.gaussian_fast(1.0) * step_size;
        self.brown
    }

    /// Signal quantized to an N-bit DAC/ADC grid plus ±½ LSB dither.
    pub fn quantization_noise(&mut self, signal: f64, bits: u32, full_scale_range: f64) -> f64 {
        self.samples += 1;

        let lsb = full_scale_range / (1u64 << bits) as f64;
        let quantized = (signal / lsb).round() * lsb;

        quantized + self.rng.gen::<f64>() * lsb - 0.5 * lsb
    }

    /// Clear filter state, the brown integrator, the Box–Muller cache and
    /// the sample counter. Does not reseed the generator.
    pub fn reset(&mut self) {
        self.pink = [0.0; PINK_TAPS];
        self.brown = 0.0;
        self.spare = None;
        self.samples = 0;
    }

    /// Reseed the generator and clear all derived state.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        self.reset();
    }

    /// Total number of samples generated since construction or reset.
    #[inline]
    pub fn samples_generated(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_seed_is_reproducible() {
        let mut a = NoiseGenerator::new(12345);
        let mut b = NoiseGenerator::new(12345);
        for _ in 0..10_000 {
            assert_eq!(a.gaussian(0.0, 1.0).to_bits(), b.gaussian(0.0, 1.0).to_bits());
        }
    }

    #[test]
    fn mixed_streams_are_reproducible() {
        let mut a = NoiseGenerator::new(7);
        let mut b = NoiseGenerator::new(7);
        for i in 0..1000 {
            match i % 5 {
                0 => assert_eq!(a.gaussian_fast(2.0).to_bits(), b.gaussian_fast(2.0).to_bits()),
                1 => assert_eq!(a.poisson(5.0).to_bits(), b.poisson(5.0).to_bits()),
                2 => assert_eq!(a.pink_noise(1.0).to_bits(), b.pink_noise(1.0).to_bits()),
                3 => assert_eq!(a.brown_noise(0.1).to_bits(), b.brown_noise(0.1).to_bits()),
                _ => assert_eq!(a.uniform(-1.0, 1.0).to_bits(), b.uniform(-1.0, 1.0).to_bits()),
            }
        }
    }

    #[test]
    fn gaussian_fast_distribution() {
        let mut gen = NoiseGenerator::new(42);
        let n = 50_000;
        let samples: Vec<f64> = (0..n).map(|_| gen.gaussian_fast(2.0)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 4.0).abs() < 0.2, "variance {var}");
    }

    #[test]
    fn poisson_mean_and_variance_converge() {
        let mut gen = NoiseGenerator::new(99);
        for lambda in [1.0, 5.0, 20.0, 100.0] {
            let n = 10_000;
            let samples: Vec<f64> = (0..n).map(|_| gen.poisson(lambda)).collect();
            let mean = samples.iter().sum::<f64>() / n as f64;
            let var =
                samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n as f64;
            assert!(
                (mean - lambda).abs() / lambda < 0.05,
                "lambda {lambda}: mean {mean}"
            );
            assert!(
                (var - lambda).abs() / lambda < 0.05,
                "lambda {lambda}: variance {var}"
            );
        }
    }

    #[test]
    fn poisson_is_non_negative_integer_below_normal_regime() {
        let mut gen = NoiseGenerator::new(3);
        for _ in 0..1000 {
            let v = gen.poisson(4.0);
            assert!(v >= 0.0);
            assert_eq!(v, v.trunc());
        }
    }

    #[test]
    fn uniform_respects_bounds() {
        let mut gen = NoiseGenerator::new(5);
        for _ in 0..1000 {
            let v = gen.uniform(-3.0, 7.0);
            assert!((-3.0..7.0).contains(&v));
        }
    }

    #[test]
    fn exponential_is_positive_with_correct_mean() {
        let mut gen = NoiseGenerator::new(11);
        let n = 20_000;
        let rate = 2.0;
        let mut sum = 0.0;
        for _ in 0..n {
            let v = gen.exponential(rate);
            assert!(v >= 0.0);
            sum += v;
        }
        let mean = sum / n as f64;
        assert!((mean - 0.5).abs() < 0.02, "mean {mean}");
    }

    #[test]
    fn quantization_respects_lsb() {
        let mut gen = NoiseGenerator::new(17);
        let bits = 8;
        let fs = 1.0;
        let lsb = fs / 256.0;
        for _ in 0..100 {
            let out = gen.quantization_noise(0.3, bits, fs);
            // Output stays within one LSB of the quantized grid point.
            let grid = (0.3f64 / lsb).round() * lsb;
            assert!((out - grid).abs() <= 0.5 * lsb + 1e-15);
        }
    }

    #[test]
    fn reset_clears_state_and_counter() {
        let mut gen = NoiseGenerator::new(1);
        for _ in 0..10 {
            gen.pink_noise(1.0);
            gen.brown_noise(1.0);
        }
        assert!(gen.samples_generated() > 0);
        gen.reset();
        assert_eq!(gen.samples_generated(), 0);
        assert_eq!(gen.brown, 0.0);
        assert_eq!(gen.pink, [0.0; PINK_TAPS]);
        assert!(gen.spare.is_none());
    }

    #[test]
    fn reseed_restarts_the_sequence() {
        let mut a = NoiseGenerator::new(123);
        let first: Vec<u64> = (0..64).map(|_| a.gaussian_fast(1.0).to_bits()).collect();
        a.reseed(123);
        let second: Vec<u64> = (0..64).map(|_| a.gaussian_fast(1.0).to_bits()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn sample_counter_is_monotonic() {
        let mut gen = NoiseGenerator::new(2);
        let mut last = gen.samples_generated();
        for _ in 0..100 {
            gen.gaussian(0.0, 1.0);
            let now = gen.samples_generated();
            assert!(now > last);
            last = now;
        }
    }
}
