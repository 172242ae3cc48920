//! Session module - the simulator collaborator seen by the control loop
//!
//! The control core only talks to a [`SimulatorSession`]. Calls are synchronous
//! and every implementation must bound how long it waits, so a lost simulator
//! surfaces as [`SessionError`] instead of hanging a tuning run.

pub mod channel;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Opaque identifier of a simulator object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub i32);

/// One sample of the body's orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    /// Deviation from upright in radians.
    pub tilt: f64,
    /// Tilt rate in radians per second.
    pub angular_velocity: f64,
    /// Simulation time since episode start.
    pub timestamp_ms: f64,
}

pub trait SimulatorSession {
    fn resolve_handle(&mut self, name: &str) -> Result<ObjectHandle, SessionError>;

    fn start_episode(&mut self) -> Result<(), SessionError>;

    fn stop_episode(&mut self) -> Result<(), SessionError>;

    fn read_orientation(&mut self, body: ObjectHandle) -> Result<Orientation, SessionError>;

    fn set_motor_velocity(&mut self, motor: ObjectHandle, velocity: f64)
        -> Result<(), SessionError>;

    /// Advance the simulation by one control tick (synchronous mode).
    fn trigger_step(&mut self) -> Result<(), SessionError>;
}

impl<S: SimulatorSession + ?Sized> SimulatorSession for &mut S {
    fn resolve_handle(&mut self, name: &str) -> Result<ObjectHandle, SessionError> {
        (**self).resolve_handle(name)
    }

    fn start_episode(&mut self) -> Result<(), SessionError> {
        (**self).start_episode()
    }

    fn stop_episode(&mut self) -> Result<(), SessionError> {
        (**self).stop_episode()
    }

    fn read_orientation(&mut self, body: ObjectHandle) -> Result<Orientation, SessionError> {
        (**self).read_orientation(body)
    }

    fn set_motor_velocity(
        &mut self,
        motor: ObjectHandle,
        velocity: f64,
    ) -> Result<(), SessionError> {
        (**self).set_motor_velocity(motor, velocity)
    }

    fn trigger_step(&mut self) -> Result<(), SessionError> {
        (**self).trigger_step()
    }
}

/// Scene object names resolved before tuning starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectNames {
    pub body: String,
    pub left_motor: String,
    pub right_motor: String,
}

impl Default for ObjectNames {
    fn default() -> Self {
        Self {
            body: "Payload".to_string(),
            left_motor: "MotorLeft".to_string(),
            right_motor: "MotorRight".to_string(),
        }
    }
}

/// Resolved handles for the body and both drive motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegwayHandles {
    pub body: ObjectHandle,
    pub left_motor: ObjectHandle,
    pub right_motor: ObjectHandle,
}

impl SegwayHandles {
    pub fn resolve<S: SimulatorSession + ?Sized>(
        session: &mut S,
        names: &ObjectNames,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            body: session.resolve_handle(&names.body)?,
            left_motor: session.resolve_handle(&names.left_motor)?,
            right_motor: session.resolve_handle(&names.right_motor)?,
        })
    }
}
