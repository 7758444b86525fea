//! # Orbit Control Unit
//!
//! Soft real-time feedback loop for beamline orbit correction. A single
//! cooperative thread samples the beam position and intensity, arbitrates
//! machine protection, runs a PID law against the steering magnet, and
//! publishes one telemetry frame per cycle while draining the command
//! channel non-blockingly.
//!
//! ## Cycle anatomy
//!
//! clock tick → sensor reads → MPS evaluation → PID step → actuator set →
//! plant-coupling update → watchdog check → telemetry frame → command
//! drain → wait next.
//!
//! ## Timing discipline
//!
//! The [`clock::PeriodicClock`] paces on absolute deadlines (drift-free);
//! the [`watchdog::Watchdog`] budgets each cycle body and the frequency
//! governor backs the loop off by 20 % after every ten cumulative misses.
//! Best-effort 1 kHz with graceful degradation; correctness never depends
//! on the optional `rt` elevation in [`rt`].

pub mod api;
pub mod clock;
pub mod command;
pub mod config;
pub mod control;
pub mod cycle;
pub mod rt;
pub mod safety;
pub mod watchdog;
