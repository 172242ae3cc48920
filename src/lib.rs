pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod session;
pub mod sim;
pub mod tuner;

pub use control::{BalanceLoop, BalanceSettings, EndReason, Episode, EpisodeResult, PidController, PidGains};
pub use error::{ControlTimingError, EpisodeError, NotFoundError, RunnerError, SessionError, TuneError};
pub use runner::{EpisodeRunner, ErrorPolicy, Mode, RunReport};
pub use session::{ObjectHandle, ObjectNames, Orientation, SegwayHandles, SimulatorSession};
pub use tuner::{CancelToken, StopReason, TuneOutcome, Twiddle, TwiddleSettings};
