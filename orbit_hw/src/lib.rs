//! # Orbit Hardware Layer
//!
//! Sensor and actuator contracts for the beamline control system, together
//! with physics-backed simulation models:
//!
//! - [`Bpm`] — beam position monitor (mm readout, rotation/calibration,
//!   temperature drift, electrode nonlinearity, composite noise)
//! - [`Bic`] — beam intensity counter (Poisson counting statistics,
//!   dark current, gain drift, saturation, calibration)
//! - [`Magnet`] — steering magnet (first-order L/R response, slew-rate
//!   limiting, saturation/hysteresis field model, quench interlock)
//!
//! All stochastic behavior flows through [`noise::NoiseGenerator`], a
//! deterministic stream keyed by a 64-bit seed, so simulated runs are
//! bitwise reproducible.
//!
//! The contracts are designed for 1 kHz+ polling: statistics are atomic
//! cells readable from observer threads, and the read/set hot paths do
//! not allocate.

pub mod actuator;
pub mod bic;
pub mod bpm;
pub mod error;
pub mod magnet;
pub mod noise;
pub mod sensor;

pub use actuator::{Actuator, ActuatorStats, SetResult};
pub use bic::Bic;
pub use bpm::{Bpm, BeamPlant, ReadoutAxis};
pub use error::{ActuatorError, SensorError};
pub use magnet::Magnet;
pub use sensor::{Reading, Sensor, SensorStats};
