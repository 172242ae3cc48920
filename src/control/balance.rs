use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::pid::PidController;
use crate::error::EpisodeError;
use crate::metrics::TuningMetrics;
use crate::session::{SegwayHandles, SimulatorSession};

/// Per-tick cost of a tilt reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFormula {
    /// `|tilt|`
    #[default]
    Absolute,
    /// `tilt²`
    Squared,
}

impl CostFormula {
    pub fn apply(self, tilt: f64) -> f64 {
        match self {
            CostFormula::Absolute => tilt.abs(),
            CostFormula::Squared => tilt * tilt,
        }
    }
}

/// How one controller output maps onto the two drive motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorConvention {
    /// Both motors receive `output`.
    #[default]
    Same,
    /// The right motor is mounted mirrored and receives `-output`.
    Mirrored,
}

impl MotorConvention {
    pub fn wheel_commands(self, output: f64) -> (f64, f64) {
        match self {
            MotorConvention::Same => (output, output),
            MotorConvention::Mirrored => (output, -output),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BalanceSettings {
    /// Radians; reaching it ends the episode as a fall.
    pub max_tilt_angle: f64,
    pub max_duration_ms: u64,
    /// Simulated time per control tick, used to price the unused time of a fall.
    pub tick_period_ms: f64,
    /// Optional wall-clock sleep between ticks.
    pub tick_pacing_ms: u64,
    pub cost_formula: CostFormula,
    pub fall_penalty_factor: f64,
    pub motor_convention: MotorConvention,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            max_tilt_angle: 0.6,
            max_duration_ms: 20_000,
            tick_period_ms: 50.0,
            tick_pacing_ms: 0,
            cost_formula: CostFormula::Absolute,
            fall_penalty_factor: 1.0,
            motor_convention: MotorConvention::Same,
        }
    }
}

impl BalanceSettings {
    /// Ticks in a full-length episode.
    pub fn total_ticks(&self) -> f64 {
        (self.max_duration_ms as f64 / self.tick_period_ms).ceil().max(1.0)
    }

    /// Cost added when the robot falls at `elapsed_ms`.
    ///
    /// A fall is charged a full episode at the tilt limit, which no surviving
    /// run can reach, plus the ticks it did not get to run so earlier falls
    /// cost more than later ones.
    pub fn fall_penalty(&self, elapsed_ms: f64) -> f64 {
        let remaining_ms = (self.max_duration_ms as f64 - elapsed_ms).max(0.0);
        let remaining_ticks = (remaining_ms / self.tick_period_ms).ceil();
        self.cost_formula.apply(self.max_tilt_angle)
            * (self.total_ticks() + remaining_ticks)
            * self.fall_penalty_factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    FellOver,
    TimeUp,
    /// Episode abandoned after a simulator failure; cost is the configured worst case.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeResult {
    pub cost: f64,
    pub elapsed_ms: u64,
    pub end_reason: EndReason,
    pub ticks: u64,
}

impl EpisodeResult {
    pub fn new(cost: f64, elapsed_ms: u64, end_reason: EndReason) -> Self {
        Self { cost, elapsed_ms, end_reason, ticks: 0 }
    }
}

/// One complete balancing attempt driven through a simulator session.
pub trait Episode {
    fn run<S: SimulatorSession + ?Sized>(
        &mut self,
        session: &mut S,
        handles: &SegwayHandles,
        pid: PidController,
    ) -> Result<EpisodeResult, EpisodeError>;
}

// ============================================================================
// BALANCE LOOP - read tilt, run PID, drive wheels, accumulate cost
// ============================================================================

pub struct BalanceLoop {
    settings: BalanceSettings,
    metrics: TuningMetrics,
}

impl BalanceLoop {
    pub fn new(settings: BalanceSettings, metrics: TuningMetrics) -> Self {
        Self { settings, metrics }
    }

    pub fn settings(&self) -> &BalanceSettings {
        &self.settings
    }
}

impl Episode for BalanceLoop {
    fn run<S: SimulatorSession + ?Sized>(
        &mut self,
        session: &mut S,
        handles: &SegwayHandles,
        mut pid: PidController,
    ) -> Result<EpisodeResult, EpisodeError> {
        let cfg = &self.settings;
        let wall_start = Instant::now();
        let mut cost = 0.0;
        let mut ticks = 0u64;

        // First sample needs simulated time past the controller's creation
        session.trigger_step()?;

        let (end_reason, elapsed_ms) = loop {
            let step_start = Instant::now();
            let reading = session.read_orientation(handles.body)?;
            let elapsed = reading.timestamp_ms;

            if reading.tilt.abs() >= cfg.max_tilt_angle {
                let penalty = cfg.fall_penalty(elapsed);
                debug!(tilt = reading.tilt, elapsed_ms = elapsed, penalty, "fell over");
                cost += penalty;
                break (EndReason::FellOver, elapsed);
            }
            if elapsed >= cfg.max_duration_ms as f64 {
                break (EndReason::TimeUp, elapsed);
            }

            let output = pid.step(reading.tilt, reading.timestamp_ms)?;
            let (left, right) = cfg.motor_convention.wheel_commands(output);
            session.set_motor_velocity(handles.left_motor, left)?;
            session.set_motor_velocity(handles.right_motor, right)?;
            self.metrics.record_control_step(step_start.elapsed());

            cost += cfg.cost_formula.apply(reading.tilt);
            ticks += 1;
            trace!(
                t_ms = elapsed,
                tilt = reading.tilt,
                rate = reading.angular_velocity,
                output,
                "control tick"
            );

            session.trigger_step()?;
            if cfg.tick_pacing_ms > 0 {
                thread::sleep(Duration::from_millis(cfg.tick_pacing_ms));
            }
        };

        let elapsed_ms = elapsed_ms.max(0.0).round() as u64;
        self.metrics.record_episode(
            elapsed_ms,
            wall_start.elapsed(),
            end_reason == EndReason::FellOver,
        );

        Ok(EpisodeResult { cost, elapsed_ms, end_reason, ticks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::pid::PidGains;
    use crate::error::SessionError;
    use crate::session::{ObjectHandle, Orientation};

    /// Scripted session: tilt follows a fixed sequence, one entry per tick.
    struct Scripted {
        tilts: Vec<f64>,
        tick: usize,
        tick_ms: f64,
        commands: Vec<(ObjectHandle, f64)>,
        fail_at_tick: Option<usize>,
    }

    impl Scripted {
        fn new(tilts: Vec<f64>) -> Self {
            Self { tilts, tick: 0, tick_ms: 50.0, commands: Vec::new(), fail_at_tick: None }
        }
    }

    impl SimulatorSession for Scripted {
        fn resolve_handle(&mut self, _name: &str) -> Result<ObjectHandle, SessionError> {
            Ok(ObjectHandle(0))
        }
        fn start_episode(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn stop_episode(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn read_orientation(&mut self, _body: ObjectHandle) -> Result<Orientation, SessionError> {
            if self.fail_at_tick == Some(self.tick) {
                return Err(SessionError::Disconnected);
            }
            let tilt = *self.tilts.get(self.tick - 1).unwrap_or(&0.0);
            Ok(Orientation { tilt, angular_velocity: 0.0, timestamp_ms: self.tick as f64 * self.tick_ms })
        }
        fn set_motor_velocity(&mut self, motor: ObjectHandle, v: f64) -> Result<(), SessionError> {
            self.commands.push((motor, v));
            Ok(())
        }
        fn trigger_step(&mut self) -> Result<(), SessionError> {
            self.tick += 1;
            Ok(())
        }
    }

    fn handles() -> SegwayHandles {
        SegwayHandles { body: ObjectHandle(1), left_motor: ObjectHandle(2), right_motor: ObjectHandle(3) }
    }

    fn settings() -> BalanceSettings {
        BalanceSettings { max_tilt_angle: 0.5, max_duration_ms: 500, ..Default::default() }
    }

    fn pid() -> PidController {
        PidController::new(PidGains::new(1.0, 0.0, 0.0), 0.0, 0.0)
    }

    #[test]
    fn survives_until_time_up() {
        let mut session = Scripted::new(vec![0.1; 20]);
        let mut episode = BalanceLoop::new(settings(), TuningMetrics::new());
        let result = episode.run(&mut session, &handles(), pid()).unwrap();

        assert_eq!(result.end_reason, EndReason::TimeUp);
        assert_eq!(result.elapsed_ms, 500);
        // Ticks at 50..450 ms are controlled, the 500 ms sample ends the episode
        assert_eq!(result.ticks, 9);
        assert!((result.cost - 0.9).abs() < 1e-9);
    }

    #[test]
    fn fall_is_penalised_for_unused_time() {
        let mut session = Scripted::new(vec![0.1, 0.2, 0.7]);
        let mut episode = BalanceLoop::new(settings(), TuningMetrics::new());
        let result = episode.run(&mut session, &handles(), pid()).unwrap();

        assert_eq!(result.end_reason, EndReason::FellOver);
        assert_eq!(result.elapsed_ms, 150);
        // 0.1 + 0.2, then 10 full-episode ticks and 7 unused ticks at the threshold
        assert!((result.cost - (0.3 + 17.0 * 0.5)).abs() < 1e-9, "{}", result.cost);
    }

    #[test]
    fn falling_costs_more_than_surviving() {
        let metrics = TuningMetrics::new();
        let survived = BalanceLoop::new(settings(), metrics.clone())
            .run(&mut Scripted::new(vec![0.45; 20]), &handles(), pid())
            .unwrap();
        let fell = BalanceLoop::new(settings(), metrics.clone())
            .run(&mut Scripted::new(vec![0.45, 0.6]), &handles(), pid())
            .unwrap();
        assert!(fell.cost > survived.cost);
        assert_eq!(metrics.report().falls, 1);
    }

    #[test]
    fn calm_early_fall_costs_more_than_shaky_survival() {
        let survived = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut Scripted::new(vec![0.49; 20]), &handles(), pid())
            .unwrap();
        let fell = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut Scripted::new(vec![0.0, 0.6]), &handles(), pid())
            .unwrap();
        assert_eq!(survived.end_reason, EndReason::TimeUp);
        assert_eq!(fell.end_reason, EndReason::FellOver);
        assert!(fell.cost >= survived.cost, "fell {} survived {}", fell.cost, survived.cost);
    }

    #[test]
    fn late_fall_costs_less_than_early_fall() {
        let mut late = vec![0.0; 8];
        late.push(0.6);
        let early = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut Scripted::new(vec![0.0, 0.6]), &handles(), pid())
            .unwrap();
        let late = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut Scripted::new(late), &handles(), pid())
            .unwrap();
        assert_eq!(late.end_reason, EndReason::FellOver);
        assert!(early.cost > late.cost);
    }

    #[test]
    fn fall_penalty_exceeds_any_full_run() {
        let cfg = settings();
        for elapsed in [0.0, 50.0, 250.0, 450.0, 500.0] {
            assert!(cfg.fall_penalty(elapsed) >= cfg.total_ticks() * 0.5);
        }
    }

    #[test]
    fn mirrored_motors_get_opposite_commands() {
        let mut session = Scripted::new(vec![0.2, 0.9]);
        let cfg = BalanceSettings { motor_convention: MotorConvention::Mirrored, ..settings() };
        BalanceLoop::new(cfg, TuningMetrics::new())
            .run(&mut session, &handles(), pid())
            .unwrap();
        assert_eq!(
            session.commands,
            vec![(ObjectHandle(2), -0.2), (ObjectHandle(3), 0.2)]
        );
    }

    #[test]
    fn squared_cost_formula() {
        let mut session = Scripted::new(vec![0.3; 20]);
        let cfg = BalanceSettings { cost_formula: CostFormula::Squared, ..settings() };
        let result = BalanceLoop::new(cfg, TuningMetrics::new())
            .run(&mut session, &handles(), pid())
            .unwrap();
        assert!((result.cost - 9.0 * 0.09).abs() < 1e-9);
    }

    #[test]
    fn lost_connection_surfaces_as_io_error() {
        let mut session = Scripted::new(vec![0.1; 20]);
        session.fail_at_tick = Some(3);
        let err = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut session, &handles(), pid())
            .unwrap_err();
        assert_eq!(err, EpisodeError::SimulationIo(SessionError::Disconnected));
    }

    #[test]
    fn stale_clock_is_a_timing_error() {
        let mut session = Scripted::new(vec![0.1; 20]);
        session.tick_ms = 0.0;
        let err = BalanceLoop::new(settings(), TuningMetrics::new())
            .run(&mut session, &handles(), pid())
            .unwrap_err();
        assert!(matches!(err, EpisodeError::ControlTiming(_)));
    }
}
