// Configuration management with layered configuration (file, env)

use crate::models::TriggerPoint;
use crate::playback::SimulatedPlayerConfig;
use crate::trigger::DEFAULT_TOLERANCE_SECONDS;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub player: PlayerConfig,
    pub triggers: Vec<TriggerPoint>,
    pub progress: ProgressConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Title being played; used to key progress checkpoints
    pub content_id: String,
    /// Half-width of each trigger window, in seconds
    pub tolerance_seconds: f64,
    pub time_update_interval_ms: u64,
    pub duration_seconds: f64,
    pub playback_rate: f64,
    /// How long the overlay keeps playback paused after a trigger
    pub overlay_hold_seconds: u64,
    /// Saved position to continue watching from
    pub resume_from_seconds: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            content_id: "oceans".to_string(),
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            time_update_interval_ms: 250,
            duration_seconds: 400.0,
            playback_rate: 1.0,
            overlay_hold_seconds: 5,
            resume_from_seconds: None,
        }
    }
}

impl PlayerConfig {
    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_interval_ms)
    }

    pub fn overlay_hold(&self) -> Duration {
        Duration::from_secs(self.overlay_hold_seconds)
    }
}

impl From<&PlayerConfig> for SimulatedPlayerConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            tick_interval: config.time_update_interval(),
            duration_seconds: config.duration_seconds,
            playback_rate: config.playback_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum change in whole seconds before a new checkpoint is saved
    pub save_threshold_seconds: u64,
    /// Percentage of the media after which playback counts as completed
    pub completion_percent: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            save_threshold_seconds: 5,
            completion_percent: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        let player = &self.player;

        if player.content_id.trim().is_empty() {
            return Err("Player content_id cannot be empty".to_string());
        }
        if !player.tolerance_seconds.is_finite() || player.tolerance_seconds <= 0.0 {
            return Err("Player tolerance_seconds must be greater than 0".to_string());
        }
        if player.time_update_interval_ms == 0 {
            return Err("Player time_update_interval_ms must be greater than 0".to_string());
        }
        // A notification gap of 2Δ or more can step over a whole window
        if player.time_update_interval().as_secs_f64() * player.playback_rate
            >= 2.0 * player.tolerance_seconds
        {
            return Err(format!(
                "Player time_update_interval_ms ({}) must advance less than twice the tolerance ({}s) per tick",
                player.time_update_interval_ms, player.tolerance_seconds
            ));
        }
        if !player.duration_seconds.is_finite() || player.duration_seconds <= 0.0 {
            return Err("Player duration_seconds must be greater than 0".to_string());
        }
        if !player.playback_rate.is_finite() || player.playback_rate <= 0.0 {
            return Err("Player playback_rate must be greater than 0".to_string());
        }

        for (index, point) in self.triggers.iter().enumerate() {
            point
                .validate(index)
                .and_then(|_| point.validate_window(index, player.tolerance_seconds))
                .map_err(|e| e.to_string())?;
        }

        if self.progress.save_threshold_seconds == 0 {
            return Err("Progress save_threshold_seconds must be greater than 0".to_string());
        }
        if !(self.progress.completion_percent > 0.0 && self.progress.completion_percent <= 100.0)
        {
            return Err("Progress completion_percent must be in (0, 100]".to_string());
        }

        if self.observability.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            triggers: TriggerPoint::default_points(),
            progress: ProgressConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerCategory;
    use std::fs;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.triggers.len(), 3);
    }

    #[test]
    fn test_validation_catches_zero_tolerance() {
        let mut settings = Settings::default();
        settings.player.tolerance_seconds = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_coarse_time_updates() {
        let mut settings = Settings::default();
        settings.player.time_update_interval_ms = 1000;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("twice the tolerance"));
    }

    #[test]
    fn test_validation_catches_bad_trigger() {
        let mut settings = Settings::default();
        settings.triggers.push(TriggerPoint::trivia(-5.0, "Q_1"));
        let err = settings.validate().unwrap_err();
        assert!(err.contains("index 3"));
    }

    #[test]
    fn test_validation_catches_collapsed_window() {
        let mut settings = Settings::default();
        settings.triggers.push(TriggerPoint::ad(1e17, "AD_BIG"));
        let err = settings.validate().unwrap_err();
        assert!(err.contains("too large"));
    }

    #[test]
    fn test_validation_catches_completion_percent() {
        let mut settings = Settings::default();
        settings.progress.completion_percent = 120.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[player]
content_id = "movie-42"
tolerance_seconds = 0.75
duration_seconds = 600.0

[[triggers]]
time = 45.0
type = "trivia"
data_id = "Q_100"
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.player.content_id, "movie-42");
        assert_eq!(settings.player.tolerance_seconds, 0.75);
        assert_eq!(settings.player.time_update_interval_ms, 250);
        assert_eq!(settings.triggers.len(), 1);
        assert_eq!(settings.triggers[0].category, TriggerCategory::Trivia);
        assert!(!settings.triggers[0].fired());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_player_config_converts_to_simulated() {
        let player = PlayerConfig::default();
        let simulated = SimulatedPlayerConfig::from(&player);
        assert_eq!(simulated.tick_interval, Duration::from_millis(250));
        assert_eq!(simulated.duration_seconds, 400.0);
    }
}
