//! Orbit Common Library
//!
//! This crate provides shared constants, value types and configuration
//! loading utilities for all orbit workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - System-wide constants (cycle timing, frequency bounds)
//! - [`config`] - Configuration loading traits and types
//! - [`limits`] - Actuator and loop-parameter clamping
//! - [`telemetry`] - Per-cycle telemetry sample and aggregate statistics
//! - [`ring`] - Fixed-capacity history buffer for telemetry samples
//! - [`atomic`] - Atomic `f64` cell for cross-thread observation
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! orbit_common = { path = "../orbit_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use orbit_common::prelude::*;
//! ```

pub mod atomic;
pub mod config;
pub mod consts;
pub mod limits;
pub mod prelude;
pub mod ring;
pub mod telemetry;
