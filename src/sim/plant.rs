use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::session::Orientation;

const GRAVITY: f64 = 9.81;

/// Physical constants of the simulated segway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    /// Pivot to centre of mass, metres.
    pub body_length: f64,
    pub wheel_radius: f64,
    /// First-order lag of the wheel speed behind its command, seconds.
    pub motor_time_constant: f64,
    pub max_acceleration: f64,
    /// Viscous damping on the tilt rate.
    pub tilt_damping: f64,
    pub physics_step_ms: f64,
    /// Simulated time advanced per trigger.
    pub tick_period_ms: f64,
    pub initial_tilt: f64,
    /// Uniform noise half-width added to tilt readings.
    pub noise_amplitude: f64,
    pub right_motor_mirrored: bool,
    pub seed: u64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            body_length: 0.4,
            wheel_radius: 0.08,
            motor_time_constant: 0.05,
            max_acceleration: 20.0,
            tilt_damping: 0.1,
            physics_step_ms: 5.0,
            tick_period_ms: 50.0,
            initial_tilt: 0.05,
            noise_amplitude: 0.0,
            right_motor_mirrored: false,
            seed: 42,
        }
    }
}

/// Wheeled inverted pendulum. Positive tilt leans backward; driving the
/// base forward pushes the body further backward.
pub struct SegwayPlant {
    config: PlantConfig,
    rng: StdRng,
    tilt: f64,
    tilt_rate: f64,
    position: f64,
    velocity: f64,
    left_command: f64,
    right_command: f64,
    time_ms: f64,
    step_counter: u64,
}

impl SegwayPlant {
    pub fn new(config: PlantConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let tilt = config.initial_tilt;
        Self {
            config,
            rng,
            tilt,
            tilt_rate: 0.0,
            position: 0.0,
            velocity: 0.0,
            left_command: 0.0,
            right_command: 0.0,
            time_ms: 0.0,
            step_counter: 0,
        }
    }

    /// Put the body back upright-ish at t = 0 with motors idle.
    pub fn reset(&mut self) {
        self.tilt = self.config.initial_tilt;
        self.tilt_rate = 0.0;
        self.position = 0.0;
        self.velocity = 0.0;
        self.left_command = 0.0;
        self.right_command = 0.0;
        self.time_ms = 0.0;
    }

    pub fn set_left_motor(&mut self, velocity: f64) {
        self.left_command = velocity;
    }

    pub fn set_right_motor(&mut self, velocity: f64) {
        self.right_command = if self.config.right_motor_mirrored {
            -velocity
        } else {
            velocity
        };
    }

    /// Advance one control tick worth of physics steps.
    pub fn advance_tick(&mut self) {
        let step_ms = self.config.physics_step_ms.max(1e-3);
        let mut remaining = self.config.tick_period_ms;
        while remaining > 1e-9 {
            let h = remaining.min(step_ms);
            self.integrate(h / 1000.0);
            remaining -= h;
        }
        self.time_ms += self.config.tick_period_ms;
        self.step_counter += 1;
    }

    fn integrate(&mut self, dt: f64) {
        let cfg = &self.config;
        let wheel_speed = 0.5 * (self.left_command + self.right_command);
        let target_velocity = wheel_speed * cfg.wheel_radius;
        let accel = ((target_velocity - self.velocity) / cfg.motor_time_constant)
            .clamp(-cfg.max_acceleration, cfg.max_acceleration);

        let tilt_accel = (GRAVITY * self.tilt.sin() + accel * self.tilt.cos()) / cfg.body_length
            - cfg.tilt_damping * self.tilt_rate;

        // Semi-implicit Euler
        self.velocity += accel * dt;
        self.position += self.velocity * dt;
        self.tilt_rate += tilt_accel * dt;
        self.tilt += self.tilt_rate * dt;
    }

    pub fn read(&mut self) -> Orientation {
        let noise = if self.config.noise_amplitude > 0.0 {
            let a = self.config.noise_amplitude;
            self.rng.gen_range(-a..a)
        } else {
            0.0
        };

        Orientation {
            tilt: self.tilt + noise,
            angular_velocity: self.tilt_rate,
            timestamp_ms: self.time_ms,
        }
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn step_count(&self) -> u64 {
        self.step_counter
    }

    pub fn inject_disturbance(&mut self, tilt_rate_delta: f64) {
        self.tilt_rate += tilt_rate_delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontrolled_body_falls_the_way_it_leans() {
        let mut plant = SegwayPlant::new(PlantConfig::default());
        let fell = (0..40).any(|_| {
            plant.advance_tick();
            plant.read().tilt > 0.5
        });
        assert!(fell, "tilt should grow without control");

        let mut plant = SegwayPlant::new(PlantConfig { initial_tilt: -0.05, ..Default::default() });
        let fell = (0..40).any(|_| {
            plant.advance_tick();
            plant.read().tilt < -0.5
        });
        assert!(fell);
    }

    #[test]
    fn driving_backward_rights_a_backward_lean() {
        let mut free = SegwayPlant::new(PlantConfig::default());
        let mut driven = SegwayPlant::new(PlantConfig::default());
        driven.set_left_motor(-30.0);
        driven.set_right_motor(-30.0);
        free.advance_tick();
        driven.advance_tick();
        assert!(driven.read().tilt < free.read().tilt);
    }

    #[test]
    fn mirrored_right_motor_is_inverted() {
        let cfg = PlantConfig { right_motor_mirrored: true, initial_tilt: 0.0, ..Default::default() };
        let mut plant = SegwayPlant::new(cfg);
        plant.set_left_motor(10.0);
        plant.set_right_motor(-10.0);
        for _ in 0..5 {
            plant.advance_tick();
        }
        assert!(plant.position() > 0.0);
    }

    #[test]
    fn clock_advances_per_tick_and_resets() {
        let mut plant = SegwayPlant::new(PlantConfig::default());
        plant.advance_tick();
        plant.advance_tick();
        assert_eq!(plant.read().timestamp_ms, 100.0);
        plant.reset();
        assert_eq!(plant.time_ms(), 0.0);
        assert_eq!(plant.read().tilt, 0.05);
    }

    #[test]
    fn noise_is_seeded() {
        let cfg = PlantConfig { noise_amplitude: 0.01, ..Default::default() };
        let mut a = SegwayPlant::new(cfg.clone());
        let mut b = SegwayPlant::new(cfg);
        for _ in 0..10 {
            assert_eq!(a.read().tilt, b.read().tilt);
        }
    }
}
