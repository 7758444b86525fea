//! Machine protection: beam loss monitors and system-wide arbitration.

pub mod blm;
pub mod mps;

pub use blm::{BeamLossMonitor, BlmStatistics};
pub use mps::MachineProtectionSystem;
