use serde::{Deserialize, Serialize};

use crate::error::ControlTimingError;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Reads `[P, I, D]` from a tuner parameter vector.
    pub fn from_slice(parameters: &[f64]) -> Option<Self> {
        match parameters {
            [kp, ki, kd] => Some(Self::new(*kp, *ki, *kd)),
            _ => None,
        }
    }

    pub fn to_vec(self) -> Vec<f64> {
        vec![self.kp, self.ki, self.kd]
    }
}

/// PID control law over simulation time in milliseconds.
///
/// State is reset only at construction; one controller lives for one episode.
#[derive(Debug, Clone)]
pub struct PidController {
    // Gains
    gains: PidGains,

    // State
    setpoint: f64,
    integral: f64,
    prev_error: f64,
    last_error: f64,
    prev_time: f64,

    // Anti-windup, off unless configured
    integral_limit: Option<f64>,
}

impl PidController {
    /// `created_at` stands in for the previous sample time on the first step.
    pub fn new(gains: PidGains, setpoint: f64, created_at: f64) -> Self {
        Self {
            gains,
            setpoint,
            integral: 0.0,
            prev_error: 0.0,
            last_error: 0.0,
            prev_time: created_at,
            integral_limit: None,
        }
    }

    /// Clamp the accumulated integral to `[-limit, limit]`.
    pub fn with_integral_limit(mut self, limit: Option<f64>) -> Self {
        self.integral_limit = limit.map(f64::abs);
        self
    }

    pub fn step(&mut self, measured_value: f64, now: f64) -> Result<f64, ControlTimingError> {
        let dt = now - self.prev_time;
        if !(dt > 0.0) {
            return Err(ControlTimingError {
                previous_ms: self.prev_time,
                now_ms: now,
            });
        }

        let error = self.setpoint - measured_value;
        self.last_error = error;

        // Proportional term
        let p = self.gains.kp * error;

        // Integral term
        self.integral += error * dt;
        if let Some(limit) = self.integral_limit {
            self.integral = self.integral.clamp(-limit, limit);
        }
        let i = self.gains.ki * self.integral;

        // Derivative term
        let derivative = (error - self.prev_error) / dt;
        let d = self.gains.kd * derivative;

        self.prev_error = error;
        self.prev_time = now;

        Ok(p + i + d)
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }
}
