//! Runner module - wires proposed gains into one simulated episode
//!
//! The runner owns the simulator session for its whole lifetime, so at most one
//! episode is ever active. Twiddle sees it only as a `parameters -> cost` function.

use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::control::{EndReason, Episode, EpisodeResult, PidController, PidGains};
use crate::error::{EpisodeError, RunnerError};
use crate::metrics::TuningMetrics;
use crate::session::{ObjectNames, SegwayHandles, SimulatorSession};
use crate::tuner::{CancelToken, StopReason, Twiddle, TwiddleSettings};

/// What to do when the simulator fails in the middle of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Score the episode with `failure_cost` and keep tuning.
    #[default]
    Penalize,
    /// Stop tuning and report the best gains found so far.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub on_error: ErrorPolicy,
    pub failure_cost: f64,
    /// Pause after each episode so the simulator can catch up.
    pub settle_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::Penalize,
            failure_cost: 1e9,
            settle_delay_ms: 100,
        }
    }
}

/// Controller settings that stay fixed while gains are tuned.
#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    /// Target tilt, upright by default.
    pub setpoint: f64,
    /// Anti-windup clamp on the PID integral; unclamped when absent.
    pub integral_limit: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Mode {
    OneShot,
    Tune {
        deltas: Option<Vec<f64>>,
        settings: TwiddleSettings,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub parameters: Vec<f64>,
    pub cost: f64,
    pub elapsed_ms: u64,
    pub evaluations: u64,
    /// `None` for a one-shot run.
    pub stop_reason: Option<StopReason>,
}

pub struct EpisodeRunner<S, E> {
    session: S,
    episode: E,
    settings: RunnerSettings,
    controller: ControllerSettings,
    metrics: TuningMetrics,
    handles: Option<SegwayHandles>,
}

impl<S: SimulatorSession, E: Episode> EpisodeRunner<S, E> {
    pub fn new(
        session: S,
        episode: E,
        settings: RunnerSettings,
        controller: ControllerSettings,
        metrics: TuningMetrics,
    ) -> Self {
        Self {
            session,
            episode,
            settings,
            controller,
            metrics,
            handles: None,
        }
    }

    /// Resolve the body and motor handles. Fails before any episode runs.
    pub fn setup(&mut self, names: &ObjectNames) -> Result<SegwayHandles, RunnerError> {
        let handles = SegwayHandles::resolve(&mut self.session, names)?;
        info!(?handles, "object handles resolved");
        self.handles = Some(handles);
        Ok(handles)
    }

    /// Stop any simulation left running by a previous client.
    pub fn halt_pending(&mut self) -> Result<(), RunnerError> {
        self.session.stop_episode()?;
        Ok(())
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// One episode with gains `[P, I, D]`.
    pub fn single_run(&mut self, parameters: &[f64]) -> Result<EpisodeResult, RunnerError> {
        let gains = PidGains::from_slice(parameters)
            .ok_or(RunnerError::ParameterCount(parameters.len()))?;
        let handles = self.handles.ok_or(RunnerError::NotSetUp)?;

        let pid = PidController::new(gains, self.controller.setpoint, 0.0)
            .with_integral_limit(self.controller.integral_limit);
        info!(p = gains.kp, i = gains.ki, d = gains.kd, "new simulation");

        let result = match self.run_episode(&handles, pid) {
            Ok(result) => result,
            Err(EpisodeError::SimulationIo(e)) if self.settings.on_error == ErrorPolicy::Penalize => {
                warn!(error = %e, cost = self.settings.failure_cost, "episode abandoned");
                self.metrics.record_failure();
                EpisodeResult::new(self.settings.failure_cost, 0, EndReason::Failed)
            }
            Err(e) => {
                error!(error = %e, "episode failed");
                self.metrics.record_failure();
                return Err(e.into());
            }
        };

        info!(
            cost = result.cost,
            elapsed_ms = result.elapsed_ms,
            end = ?result.end_reason,
            "simulation finished"
        );

        if self.settings.settle_delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.settings.settle_delay_ms));
        }
        Ok(result)
    }

    fn run_episode(
        &mut self,
        handles: &SegwayHandles,
        pid: PidController,
    ) -> Result<EpisodeResult, EpisodeError> {
        if let Err(e) = self.session.start_episode() {
            // A late reply may still have started the simulation
            if let Err(stop_err) = self.session.stop_episode() {
                warn!(error = %stop_err, "could not stop simulation after failed start");
            }
            return Err(e.into());
        }
        let result = self.episode.run(&mut self.session, handles, pid);

        // Stop regardless of how the episode ended
        let stopped = self.session.stop_episode();
        match (result, stopped) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "could not stop simulation after failure");
                }
                Err(e)
            }
        }
    }

    /// Tune gains starting from `initial` with Twiddle, one episode per evaluation.
    pub fn tune(
        &mut self,
        initial: Vec<f64>,
        deltas: Option<Vec<f64>>,
        settings: TwiddleSettings,
        cancel: &CancelToken,
    ) -> Result<RunReport, RunnerError> {
        let mut twiddle = Twiddle::new(initial, deltas, settings)?;
        info!(deltas = ?twiddle.deltas(), "starting twiddle");

        let outcome = twiddle.tune(|p| self.single_run(p), cancel)?;
        Ok(RunReport {
            parameters: outcome.best_parameters,
            cost: outcome.best_cost,
            elapsed_ms: outcome.best_elapsed_ms,
            evaluations: outcome.evaluations,
            stop_reason: Some(outcome.stop_reason),
        })
    }

    pub fn run(
        &mut self,
        mode: Mode,
        parameters: Vec<f64>,
        cancel: &CancelToken,
    ) -> Result<RunReport, RunnerError> {
        match mode {
            Mode::OneShot => {
                let result = self.single_run(&parameters)?;
                Ok(RunReport {
                    parameters,
                    cost: result.cost,
                    elapsed_ms: result.elapsed_ms,
                    evaluations: 1,
                    stop_reason: None,
                })
            }
            Mode::Tune { deltas, settings } => self.tune(parameters, deltas, settings, cancel),
        }
    }
}
