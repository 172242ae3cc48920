use segway_tuner::metrics::TuningMetrics;
use segway_tuner::runner::{ControllerSettings, ErrorPolicy, RunnerSettings};
use segway_tuner::session::channel::{ChannelSession, SimChannels};
use segway_tuner::sim::{spawn_simulator, PlantConfig, SegwayPlant};
use segway_tuner::{
    BalanceLoop, BalanceSettings, CancelToken, EndReason, EpisodeRunner, Mode, ObjectNames,
    StopReason, TwiddleSettings,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn disturbance_changes_tilt() {
    let mut plant = SegwayPlant::new(PlantConfig { initial_tilt: 0.0, ..Default::default() });
    let before = plant.read().tilt;
    plant.inject_disturbance(2.0);
    plant.advance_tick();
    let after = plant.read().tilt;
    assert!((after - before).abs() > 0.05);
}

fn frozen_runner(
    on_error: ErrorPolicy,
) -> EpisodeRunner<ChannelSession, BalanceLoop> {
    let channels = SimChannels::new(16);
    let (_handle, stats) = spawn_simulator(PlantConfig::default(), ObjectNames::default(), channels.clone());
    let session = ChannelSession::connect(&channels, Duration::from_millis(50));
    let metrics = TuningMetrics::new();
    let mut runner = EpisodeRunner::new(
        session,
        BalanceLoop::new(BalanceSettings { max_duration_ms: 500, ..Default::default() }, metrics.clone()),
        RunnerSettings { on_error, failure_cost: 1e6, settle_delay_ms: 0 },
        ControllerSettings::default(),
        metrics,
    );
    runner.setup(&ObjectNames::default()).unwrap();
    stats.frozen.store(true, Ordering::Relaxed);
    runner
}

#[test]
fn frozen_simulator_scores_worst_case() {
    let mut runner = frozen_runner(ErrorPolicy::Penalize);
    let result = runner.single_run(&[13.7, 0.199, 1286.0]).unwrap();
    assert_eq!(result.end_reason, EndReason::Failed);
    assert_eq!(result.cost, 1e6);
}

#[test]
fn frozen_simulator_aborts_before_tuning_starts() {
    let mut runner = frozen_runner(ErrorPolicy::Abort);
    let mode = Mode::Tune { deltas: None, settings: TwiddleSettings::default() };
    let outcome = runner.run(mode, vec![13.7, 0.199, 1286.0], &CancelToken::new());
    assert!(outcome.is_err(), "nothing was evaluated, so there is nothing to report");
}

#[test]
fn frozen_simulator_keeps_tuning_under_penalty() {
    let mut runner = frozen_runner(ErrorPolicy::Penalize);
    let mode = Mode::Tune {
        deltas: None,
        settings: TwiddleSettings { tolerance: 0.01, max_evaluations: Some(3) },
    };
    let report = runner.run(mode, vec![13.7, 0.199, 1286.0], &CancelToken::new()).unwrap();
    assert_eq!(report.stop_reason, Some(StopReason::EvaluationLimit));
    assert_eq!(report.cost, 1e6);
    assert_eq!(report.parameters, vec![13.7, 0.199, 1286.0]);
}
