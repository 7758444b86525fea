//! Hardware bundle consumed by the control loop.
//!
//! [`ControlApi`] groups the position monitor, the intensity counter and
//! the steering magnet behind one monomorphized surface: the loop is
//! generic over the concrete devices, so there is no dynamic dispatch on
//! the hot path. The same bundle works for the simulated instruments and
//! for real device drivers implementing the same contracts.

use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Actuator, ActuatorError, Sensor, SensorError};
use thiserror::Error;

/// Failure while bringing the hardware bundle up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// Position monitor initialization failed.
    #[error("BPM initialization failed: {0}")]
    Bpm(SensorError),
    /// Intensity counter initialization failed.
    #[error("BIC initialization failed: {0}")]
    Bic(SensorError),
    /// Steering magnet initialization failed.
    #[error("magnet initialization failed: {0}")]
    Magnet(ActuatorError),
}

/// The sensor/actuator set the loop operates on.
pub struct ControlApi<P, I, M>
where
    P: Sensor + BeamPlant,
    I: Sensor,
    M: Actuator,
{
    /// Beam position monitor.
    pub bpm: P,
    /// Beam intensity counter.
    pub bic: I,
    /// Steering magnet.
    pub magnet: M,
}

impl<P, I, M> ControlApi<P, I, M>
where
    P: Sensor + BeamPlant,
    I: Sensor,
    M: Actuator,
{
    /// Bundle the devices.
    pub fn new(bpm: P, bic: I, magnet: M) -> Self {
        Self { bpm, bic, magnet }
    }

    /// Initialize all devices in readout order.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        self.bpm.initialize().map_err(InitError::Bpm)?;
        self.bic.initialize().map_err(InitError::Bic)?;
        self.magnet.initialize().map_err(InitError::Magnet)?;
        Ok(())
    }

    /// Shut all devices down, actuator first.
    pub fn shutdown(&mut self) {
        self.magnet.shutdown();
        self.bpm.shutdown();
        self.bic.shutdown();
    }

    /// Read the beam position [mm].
    pub fn read_pos(&mut self) -> Result<f64, SensorError> {
        let reading = self.bpm.read_with_metadata();
        match reading.error {
            None => Ok(reading.value),
            Some(e) => Err(e),
        }
    }

    /// Read the beam intensity [counts/s].
    pub fn read_intensity(&mut self) -> Result<f64, SensorError> {
        let reading = self.bic.read_with_metadata();
        match reading.error {
            None => Ok(reading.value),
            Some(e) => Err(e),
        }
    }

    /// Command the steering magnet [A].
    pub fn set_magnet(&mut self, current_a: f64) -> Result<(), ActuatorError> {
        self.magnet.set(current_a)
    }

    /// Actual magnet current [A].
    pub fn magnet_current(&self) -> f64 {
        self.magnet.get()
    }

    /// Latch the magnet emergency stop (drops to 0 A).
    pub fn emergency_stop(&mut self) {
        self.magnet.emergency_stop();
    }

    /// Clear the magnet emergency latch.
    pub fn reset_actuator_emergency(&mut self) {
        self.magnet.reset_emergency();
    }

    /// Shift the simulated beam horizontally (closed-loop coupling).
    pub fn inject_beam_offset(&mut self, dx_mm: f64) {
        let (x, y) = self.bpm.beam_position();
        self.bpm.set_beam_position(x + dx_mm, y);
    }

    /// Re-centre the simulated beam (recommissioning).
    pub fn recenter_beam(&mut self) {
        self.bpm.set_beam_position(0.0, 0.0);
    }

    /// True if every device passes its health predicate.
    pub fn all_healthy(&self) -> bool {
        self.bpm.is_healthy() && self.bic.is_healthy() && self.magnet.is_healthy()
    }
}
