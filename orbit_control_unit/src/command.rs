//! Command dispatch for the runtime JSON channel.
//!
//! One request yields exactly one response. Invalid requests are answered
//! with `{"ok":false,...}` and never mutate loop state.

use crate::control::PidGains;
use crate::cycle::RtLoop;
use orbit_hw::bpm::BeamPlant;
use orbit_hw::{Actuator, Sensor};
use orbit_ipc::codec::{
    decode_error_response, decode_request, ok_response, CommandRequest, PidGainsStatus,
    StatusSnapshot,
};
use tracing::info;

impl<P, I, M> RtLoop<P, I, M>
where
    P: Sensor + BeamPlant,
    I: Sensor,
    M: Actuator,
{
    /// Decode and execute one command, producing the JSON response.
    pub fn handle_command(&mut self, payload: &str) -> String {
        match decode_request(payload) {
            Ok(request) => self.apply_command(request),
            Err(e) => decode_error_response(&e),
        }
    }

    fn apply_command(&mut self, request: CommandRequest) -> String {
        match request {
            CommandRequest::SetPid { kp, ki, kd } => {
                let gains = self.pid.gains;
                let (kp, ki, kd) = self.limits.clamp_pid_gains(
                    kp.unwrap_or(gains.kp),
                    ki.unwrap_or(gains.ki),
                    kd.unwrap_or(gains.kd),
                );
                self.pid.gains = PidGains { kp, ki, kd };
                info!(kp, ki, kd, "PID gains updated");
                ok_response("PID gains updated")
            }

            CommandRequest::SetFreq { hz } => {
                let new_freq = self.limits.clamp_frequency(hz);
                self.shared.set_frequency(new_freq);
                self.apply_frequency(new_freq);
                info!(frequency_hz = new_freq, "loop frequency updated");
                ok_response("Frequency updated")
            }

            CommandRequest::SetSetpoint { sp } => {
                self.pid.set_setpoint(sp, true);
                ok_response("Setpoint updated")
            }

            CommandRequest::Recommission => {
                self.pid.reset();
                self.pid.set_setpoint(0.0, true);

                // Zero and release the actuator, re-centre the beam.
                self.api.emergency_stop();
                self.api.reset_actuator_emergency();
                self.api.recenter_beam();

                self.mps.reset();
                self.shared.clear_emergency();
                self.shared.set_control_enabled(true);
                self.reset_timing_stats();
                self.watchdog.reset_all();
                self.stats_window.reset();

                info!("system recommissioned");
                ok_response("System recommissioned")
            }

            CommandRequest::EmergencyStop => {
                self.shared.latch_emergency();
                self.shared.set_control_enabled(false);
                self.api.emergency_stop();
                info!("emergency stop command latched");
                ok_response("Emergency stop activated")
            }

            CommandRequest::EnableControl { enable } => {
                // Ignored while the emergency latch is set; commands do
                // not silently unlatch safety state.
                if !self.shared.emergency_stop() {
                    self.shared.set_control_enabled(enable);
                    if !enable {
                        let _ = self.api.set_magnet(0.0);
                    }
                }
                ok_response("Control enable updated")
            }

            CommandRequest::GetStatus => {
                let gains = self.pid.gains;
                StatusSnapshot {
                    ok: true,
                    loop_frequency: self.shared.frequency_hz(),
                    loop_count: self.shared.loop_count(),
                    deadline_misses: self.shared.deadline_misses(),
                    avg_loop_time_ms: self.shared.avg_loop_time_ms(),
                    max_loop_time_ms: self.shared.max_loop_time_ms(),
                    control_enabled: self.shared.control_enabled(),
                    emergency_stop: self.shared.emergency_stop(),
                    mps_safe: self.mps.is_beam_permitted(),
                    mps_abort: self.mps.is_abort_active(),
                    pid_gains: PidGainsStatus {
                        kp: gains.kp,
                        ki: gains.ki,
                        kd: gains.kd,
                    },
                    setpoint: self.pid.setpoint(),
                }
                .to_json()
            }

            CommandRequest::Stop => {
                self.shared.request_stop();
                info!("stop command received");
                ok_response("Stopping control loop")
            }
        }
    }
}
