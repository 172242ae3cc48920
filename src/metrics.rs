//! Metrics module - control-loop and episode timing statistics

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TUNING METRICS - shared across runner, control loop and reporting
// ============================================================================

#[derive(Clone)]
pub struct TuningMetrics {
    control_step_hist: Arc<Mutex<Histogram<u64>>>,
    episode_sim_hist: Arc<Mutex<Histogram<u64>>>,
    episode_wall_hist: Arc<Mutex<Histogram<u64>>>,
    episodes: Arc<AtomicU64>,
    falls: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

fn histogram() -> Arc<Mutex<Histogram<u64>>> {
    Arc::new(Mutex::new(
        Histogram::new(3).expect("3 significant figures is a valid precision"),
    ))
}

impl Default for TuningMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningMetrics {
    pub fn new() -> Self {
        Self {
            control_step_hist: histogram(),
            episode_sim_hist: histogram(),
            episode_wall_hist: histogram(),
            episodes: Arc::new(AtomicU64::new(0)),
            falls: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wall time spent on one read-compute-command cycle.
    pub fn record_control_step(&self, duration: Duration) {
        self.control_step_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    pub fn record_episode(&self, simulated_ms: u64, wall: Duration, fell_over: bool) {
        self.episode_sim_hist.lock().record(simulated_ms).ok();
        self.episode_wall_hist.lock().record(wall.as_millis() as u64).ok();
        self.episodes.fetch_add(1, Ordering::Relaxed);
        if fell_over {
            self.falls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        let step = self.control_step_hist.lock();
        let sim = self.episode_sim_hist.lock();
        let wall = self.episode_wall_hist.lock();

        MetricsReport {
            control_step_p50: Duration::from_nanos(step.value_at_quantile(0.5)),
            control_step_p99: Duration::from_nanos(step.value_at_quantile(0.99)),
            episode_sim_p50_ms: sim.value_at_quantile(0.5),
            episode_sim_max_ms: sim.max(),
            episode_wall_p50: Duration::from_millis(wall.value_at_quantile(0.5)),
            episodes: self.episodes.load(Ordering::Relaxed),
            falls: self.falls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// METRICS REPORT - Summary statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub control_step_p50: Duration,
    pub control_step_p99: Duration,
    pub episode_sim_p50_ms: u64,
    pub episode_sim_max_ms: u64,
    pub episode_wall_p50: Duration,
    pub episodes: u64,
    pub falls: u64,
    pub failures: u64,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Episodes: {} ({} fell over, {} failed)", self.episodes, self.falls, self.failures)?;
        writeln!(
            f,
            "Episode length P50: {} ms, max: {} ms (wall P50: {:?})",
            self.episode_sim_p50_ms, self.episode_sim_max_ms, self.episode_wall_p50
        )?;
        write!(
            f,
            "Control step P50: {:?}, P99: {:?}",
            self.control_step_p50, self.control_step_p99
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_episodes_and_falls() {
        let metrics = TuningMetrics::new();
        metrics.record_episode(1200, Duration::from_millis(3), true);
        metrics.record_episode(5000, Duration::from_millis(9), false);
        metrics.record_failure();

        let report = metrics.report();
        assert_eq!(report.episodes, 2);
        assert_eq!(report.falls, 1);
        assert_eq!(report.failures, 1);
        assert!(report.episode_sim_max_ms >= 4995);
    }

    #[test]
    fn clones_share_histograms() {
        let metrics = TuningMetrics::new();
        let other = metrics.clone();
        other.record_control_step(Duration::from_micros(40));
        assert!(metrics.report().control_step_p50 >= Duration::from_micros(39));
    }
}
