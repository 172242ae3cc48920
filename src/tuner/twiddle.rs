use serde::Deserialize;
use std::fmt::Display;
use tracing::{debug, info, warn};

use super::CancelToken;
use crate::control::EpisodeResult;
use crate::error::TuneError;

const GROW: f64 = 1.1;
const SHRINK: f64 = 0.9;
const DEFAULT_DELTA_SCALE: f64 = 0.8;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwiddleSettings {
    /// Search stops once the deltas sum below this.
    pub tolerance: f64,
    pub max_evaluations: Option<u64>,
}

impl Default for TwiddleSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_evaluations: None,
        }
    }
}

/// Trial phase of the coordinate currently being perturbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `p[d] + delta[d]` is being evaluated.
    Increase,
    /// The increase did not help; `p[d] - delta[d]` is being evaluated.
    Decrease,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Converged,
    Cancelled,
    EvaluationLimit,
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuneOutcome {
    pub best_parameters: Vec<f64>,
    pub best_cost: f64,
    pub best_elapsed_ms: u64,
    pub evaluations: u64,
    pub stop_reason: StopReason,
    /// Best cost after each completed evaluation, starting with the initial one.
    pub best_cost_history: Vec<f64>,
}

/// Coordinate-descent search over a parameter vector.
pub struct Twiddle {
    settings: TwiddleSettings,
    params: Vec<f64>,
    deltas: Vec<f64>,
    best_params: Vec<f64>,
    best_cost: f64,
    best_elapsed_ms: u64,
    dimension: usize,
    phase: Phase,
    evaluations: u64,
    history: Vec<f64>,
}

impl Twiddle {
    /// Deltas default to `0.8 × |p|` per parameter.
    pub fn new(
        initial: Vec<f64>,
        deltas: Option<Vec<f64>>,
        settings: TwiddleSettings,
    ) -> Result<Self, TuneError> {
        if initial.is_empty() {
            return Err(TuneError::EmptyParameters);
        }
        if let Some(index) = initial.iter().position(|p| !p.is_finite()) {
            return Err(TuneError::NonFiniteParameter { index });
        }
        if !(settings.tolerance > 0.0) {
            return Err(TuneError::InvalidTolerance(settings.tolerance));
        }

        let deltas = deltas.unwrap_or_else(|| default_deltas(&initial));
        if deltas.len() != initial.len() {
            return Err(TuneError::LengthMismatch {
                parameters: initial.len(),
                deltas: deltas.len(),
            });
        }
        if let Some(index) = deltas.iter().position(|d| !d.is_finite() || *d < 0.0) {
            return Err(TuneError::InvalidDelta { index, value: deltas[index] });
        }

        Ok(Self {
            settings,
            best_params: initial.clone(),
            params: initial,
            deltas,
            best_cost: f64::INFINITY,
            best_elapsed_ms: 0,
            dimension: 0,
            phase: Phase::Increase,
            evaluations: 0,
            history: Vec::new(),
        })
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    pub fn best_parameters(&self) -> &[f64] {
        &self.best_params
    }

    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn converged(&self) -> bool {
        self.deltas.iter().sum::<f64>() < self.settings.tolerance
    }

    /// Record the cost of the starting point. Must precede `propose`.
    pub fn observe_initial(&mut self, result: &EpisodeResult) {
        self.evaluations += 1;
        self.best_cost = result.cost;
        self.best_elapsed_ms = result.elapsed_ms;
        self.history.push(self.best_cost);
        info!(params = ?self.params, cost = result.cost, "initial parameters evaluated");
    }

    /// Apply the move for the current phase and return the vector to evaluate.
    pub fn propose(&mut self) -> Vec<f64> {
        let d = self.dimension;
        match self.phase {
            Phase::Increase => self.params[d] += self.deltas[d],
            Phase::Decrease => self.params[d] -= 2.0 * self.deltas[d],
        }
        self.params.clone()
    }

    /// Feed back the cost of the last proposal and move the state machine on.
    pub fn observe(&mut self, result: &EpisodeResult) {
        let d = self.dimension;
        self.evaluations += 1;

        if result.cost < self.best_cost {
            self.best_cost = result.cost;
            self.best_elapsed_ms = result.elapsed_ms;
            self.best_params.clone_from(&self.params);
            self.deltas[d] *= GROW;
            info!(
                dimension = d,
                params = ?self.best_params,
                cost = self.best_cost,
                "improved"
            );
            self.settle();
        } else {
            match self.phase {
                Phase::Increase => self.phase = Phase::Decrease,
                Phase::Decrease => {
                    self.params[d] += self.deltas[d];
                    self.deltas[d] *= SHRINK;
                    self.settle();
                }
            }
        }

        self.history.push(self.best_cost);
    }

    fn settle(&mut self) {
        self.dimension = (self.dimension + 1) % self.params.len();
        self.phase = Phase::Increase;
        debug!(deltas = ?self.deltas, "coordinate settled");
    }

    fn outcome(&self, stop_reason: StopReason) -> TuneOutcome {
        TuneOutcome {
            best_parameters: self.best_params.clone(),
            best_cost: self.best_cost,
            best_elapsed_ms: self.best_elapsed_ms,
            evaluations: self.evaluations,
            stop_reason,
            best_cost_history: self.history.clone(),
        }
    }

    /// Run the search with `evaluate` as the cost function.
    ///
    /// `cancel` is honoured only between evaluations. A failing evaluation after
    /// the first ends the search with the best result found so far.
    pub fn tune<F, E>(&mut self, mut evaluate: F, cancel: &CancelToken) -> Result<TuneOutcome, TuneError>
    where
        F: FnMut(&[f64]) -> Result<EpisodeResult, E>,
        E: Display,
    {
        let initial = evaluate(&self.params).map_err(|e| TuneError::InitialEvaluation(e.to_string()))?;
        self.observe_initial(&initial);

        loop {
            if cancel.is_cancelled() {
                warn!(evaluations = self.evaluations, "tuning interrupted");
                return Ok(self.outcome(StopReason::Cancelled));
            }
            if self.phase == Phase::Increase && self.converged() {
                info!(evaluations = self.evaluations, "tuning converged");
                return Ok(self.outcome(StopReason::Converged));
            }
            if let Some(max) = self.settings.max_evaluations {
                if self.evaluations >= max {
                    return Ok(self.outcome(StopReason::EvaluationLimit));
                }
            }

            let candidate = self.propose();
            match evaluate(&candidate) {
                Ok(result) => self.observe(&result),
                Err(e) => {
                    warn!(error = %e, "evaluation failed, stopping with best so far");
                    return Ok(self.outcome(StopReason::Aborted { reason: e.to_string() }));
                }
            }
        }
    }
}

fn default_deltas(params: &[f64]) -> Vec<f64> {
    params.iter().map(|p| DEFAULT_DELTA_SCALE * p.abs()).collect()
}
