//! Discrete-time PID controller with conditional anti-windup and
//! derivative-kick suppression.
//!
//! The controller uses the standard form
//! `u = Kp·e + Ki·∫e dτ + Kd·de/dt` with `e = setpoint − measurement`.
//! The integrator is clamped to configurable bounds, and integration is
//! additionally gated by the output saturation state: while the output is
//! pinned against a limit, the integrator only moves if doing so brings
//! the output back toward the feasible region.
//!
//! The derivative acts on the error difference; setpoint changes adjust
//! the stored previous error so the next derivative sample is unaffected
//! (bumpless transfer).

/// PID gain triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (0 = disabled).
    pub ki: f64,
    /// Derivative gain (0 = disabled).
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

/// Stateful discrete-time PID controller.
#[derive(Debug, Clone)]
pub struct Pid {
    /// Controller gains (tunable at runtime).
    pub gains: PidGains,

    setpoint: f64,
    integ: f64,
    prev_err: f64,
    integ_min: f64,
    integ_max: f64,

    // Diagnostics from the most recent step.
    last_proportional: f64,
    last_integral: f64,
    last_derivative: f64,
    last_error: f64,
}

impl Default for Pid {
    fn default() -> Self {
        Self::new(PidGains::default())
    }
}

impl Pid {
    /// Construct with the given gains, zero setpoint and wide-open
    /// integrator bounds.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            setpoint: 0.0,
            integ: 0.0,
            prev_err: 0.0,
            integ_min: -1e6,
            integ_max: 1e6,
            last_proportional: 0.0,
            last_integral: 0.0,
            last_derivative: 0.0,
            last_error: 0.0,
        }
    }

    /// Execute one control step.
    ///
    /// Returns the control output clamped to `[out_min, out_max]`.
    pub fn step(&mut self, measurement: f64, dt: f64, out_min: f64, out_max: f64) -> f64 {
        let error = self.setpoint - measurement;
        self.last_error = error;

        let proportional = self.gains.kp * error;
        self.last_proportional = proportional;

        if dt > 0.0 {
            let tentative_integ = (self.integ + error * dt).clamp(self.integ_min, self.integ_max);
            let tentative_output = proportional + self.gains.ki * tentative_integ;

            if tentative_output >= out_min && tentative_output <= out_max {
                // Output stays feasible: accept the integration.
                self.integ = tentative_integ;
            } else {
                // Output would saturate. Integrate only if it moves the
                // output back toward the feasible region.
                let current_output = proportional + self.gains.ki * self.integ;
                if (tentative_output > out_max && current_output > tentative_output)
                    || (tentative_output < out_min && current_output < tentative_output)
                {
                    self.integ = tentative_integ;
                }
            }
        }

        let integral = self.gains.ki * self.integ;
        self.last_integral = integral;

        let derivative = if dt > 1e-9 && self.gains.kd != 0.0 {
            self.gains.kd * (error - self.prev_err) / dt
        } else {
            0.0
        };
        self.last_derivative = derivative;

        self.prev_err = error;

        (proportional + integral + derivative).clamp(out_min, out_max)
    }

    /// Reset integrator, derivative state and diagnostics.
    pub fn reset(&mut self) {
        self.integ = 0.0;
        self.prev_err = 0.0;
        self.last_proportional = 0.0;
        self.last_integral = 0.0;
        self.last_derivative = 0.0;
        self.last_error = 0.0;
    }

    /// Update the setpoint.
    ///
    /// With `reset_derivative`, the stored previous error is shifted so
    /// the next derivative sample equals what it would have been without
    /// the setpoint change (no derivative kick).
    pub fn set_setpoint(&mut self, new_setpoint: f64, reset_derivative: bool) {
        if reset_derivative {
            self.prev_err = new_setpoint - (self.setpoint - self.prev_err);
        }
        self.setpoint = new_setpoint;
    }

    /// Current setpoint.
    #[inline]
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Configure the integrator bounds, re-clamping the current value.
    pub fn set_integrator_limits(&mut self, min: f64, max: f64) {
        self.integ_min = min;
        self.integ_max = max;
        self.integ = self.integ.clamp(min, max);
    }

    /// Integrator bounds as `(min, max)`.
    #[inline]
    pub fn integrator_limits(&self) -> (f64, f64) {
        (self.integ_min, self.integ_max)
    }

    /// Current integrator value.
    #[inline]
    pub fn integrator(&self) -> f64 {
        self.integ
    }

    /// True if the integrator is pinned at a bound.
    #[inline]
    pub fn is_integrator_saturated(&self) -> bool {
        self.integ <= self.integ_min || self.integ >= self.integ_max
    }

    /// True if the last unclamped output hit the given limits.
    pub fn is_saturated(&self, out_min: f64, out_max: f64) -> bool {
        let total = self.last_proportional + self.last_integral + self.last_derivative;
        total <= out_min || total >= out_max
    }

    /// Proportional contribution from the last step.
    #[inline]
    pub fn last_proportional(&self) -> f64 {
        self.last_proportional
    }

    /// Integral contribution from the last step.
    #[inline]
    pub fn last_integral(&self) -> f64 {
        self.last_integral
    }

    /// Derivative contribution from the last step.
    #[inline]
    pub fn last_derivative(&self) -> f64 {
        self.last_derivative
    }

    /// Error from the last step.
    #[inline]
    pub fn last_error(&self) -> f64 {
        self.last_error
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
