// Configuration loading: TOML file with defaults for every section
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::control::balance::MotorConvention;
use crate::control::BalanceSettings;
use crate::error::ConfigError;
use crate::runner::{ControllerSettings, RunnerSettings};
use crate::session::ObjectNames;
use crate::sim::PlantConfig;
use crate::tuner::TwiddleSettings;

pub const DEFAULT_PARAMS: [f64; 3] = [13.7, 0.199, 1286.0];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PidSection {
    /// Starting gains `[Kp, Ki, Kd]`.
    pub params: [f64; 3],
    /// Twiddle deltas; `0.8 × params` when absent.
    pub deltas: Option<[f64; 3]>,
    pub setpoint: f64,
    pub integral_limit: Option<f64>,
}

impl Default for PidSection {
    fn default() -> Self {
        Self {
            params: DEFAULT_PARAMS,
            deltas: None,
            setpoint: 0.0,
            integral_limit: None,
        }
    }
}

impl PidSection {
    pub fn controller(&self) -> ControllerSettings {
        ControllerSettings {
            setpoint: self.setpoint,
            integral_limit: self.integral_limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Upper bound on every simulator call.
    pub timeout_ms: u64,
    pub channel_capacity: usize,
    pub objects: ObjectNames,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            channel_capacity: 64,
            objects: ObjectNames::default(),
        }
    }
}

impl SessionSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pid: PidSection,
    pub twiddle: TwiddleSettings,
    pub episode: BalanceSettings,
    pub runner: RunnerSettings,
    pub session: SessionSection,
    pub plant: PlantConfig,
}

impl AppConfig {
    pub fn from_toml(text: &str, path: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.episode.max_tilt_angle > 0.0) {
            return invalid(format!("episode.max_tilt_angle must be positive, got {}", self.episode.max_tilt_angle));
        }
        if self.episode.max_duration_ms == 0 {
            return invalid("episode.max_duration_ms must be positive".to_string());
        }
        if !(self.episode.tick_period_ms > 0.0) {
            return invalid(format!("episode.tick_period_ms must be positive, got {}", self.episode.tick_period_ms));
        }
        if !(self.plant.tick_period_ms > 0.0) || !(self.plant.physics_step_ms > 0.0) {
            return invalid("plant tick and physics step must be positive".to_string());
        }
        if (self.plant.tick_period_ms - self.episode.tick_period_ms).abs() > 1e-9 {
            return invalid(format!(
                "plant.tick_period_ms ({}) and episode.tick_period_ms ({}) disagree",
                self.plant.tick_period_ms, self.episode.tick_period_ms
            ));
        }
        if !(self.episode.fall_penalty_factor >= 1.0) {
            return invalid(format!(
                "episode.fall_penalty_factor must be at least 1, got {}",
                self.episode.fall_penalty_factor
            ));
        }
        // Left and right commands cancel out unless both sides agree on the mounting
        let mirrored = self.episode.motor_convention == MotorConvention::Mirrored;
        if mirrored != self.plant.right_motor_mirrored {
            return invalid(format!(
                "episode.motor_convention ({:?}) disagrees with plant.right_motor_mirrored ({})",
                self.episode.motor_convention, self.plant.right_motor_mirrored
            ));
        }
        if !(self.twiddle.tolerance > 0.0) {
            return invalid(format!("twiddle.tolerance must be positive, got {}", self.twiddle.tolerance));
        }
        if self.session.timeout_ms == 0 || self.session.channel_capacity == 0 {
            return invalid("session.timeout_ms and session.channel_capacity must be positive".to_string());
        }
        if let Some(deltas) = self.pid.deltas {
            if deltas.iter().any(|d| !d.is_finite() || *d < 0.0) {
                return invalid(format!("pid.deltas must be non-negative, got {:?}", deltas));
            }
        }
        Ok(())
    }
}

/// Read `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    match std::fs::read_to_string(path) {
        Ok(text) => AppConfig::from_toml(&text, &shown),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %shown, "no config file, using defaults");
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path: shown, source }),
    }
}
