//! Error module - failure taxonomy shared by the controller, session, runner and tuner

use thiserror::Error;

// ============================================================================
// CONTROL TIMING - contract violation inside a PID step
// ============================================================================

/// Raised when a PID step is fed a timestamp that does not move forward.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("non-increasing control timestamp: previous {previous_ms} ms, now {now_ms} ms")]
pub struct ControlTimingError {
    pub previous_ms: f64,
    pub now_ms: f64,
}

// ============================================================================
// SESSION - failures of the simulator collaborator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no simulator object named `{name}`")]
pub struct NotFoundError {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("simulator did not answer within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("simulator connection lost")]
    Disconnected,

    #[error("simulator returned error code {code}: {message}")]
    Remote { code: i32, message: String },

    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

// ============================================================================
// EPISODE - one balance attempt
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EpisodeError {
    #[error("simulation I/O failed: {0}")]
    SimulationIo(#[from] SessionError),

    #[error(transparent)]
    ControlTiming(#[from] ControlTimingError),
}

// ============================================================================
// RUNNER / TUNER / CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunnerError {
    #[error("episode runner used before object handles were resolved")]
    NotSetUp,

    #[error("expected 3 PID parameters, got {0}")]
    ParameterCount(usize),

    #[error(transparent)]
    Episode(#[from] EpisodeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tune(#[from] TuneError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuneError {
    #[error("parameter vector is empty")]
    EmptyParameters,

    #[error("got {deltas} deltas for {parameters} parameters")]
    LengthMismatch { parameters: usize, deltas: usize },

    #[error("delta {index} is {value}; deltas must be finite and non-negative")]
    InvalidDelta { index: usize, value: f64 },

    #[error("parameter {index} is not finite")]
    NonFiniteParameter { index: usize },

    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),

    #[error("initial evaluation failed: {0}")]
    InitialEvaluation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
