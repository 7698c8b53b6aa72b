//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `config/interrogator.toml` by default)
//! 2. Environment variables (prefixed with `INTERROGATOR_`, `__` separating sections)
//!
//! # Environment Variable Overrides
//!
//! ```text
//! INTERROGATOR_APPLICATION__LOG_LEVEL=debug
//! INTERROGATOR_ACQUISITION__PERIOD_MS=500
//! INTERROGATOR_ARTIFACTS__DROP_DIR=/data/drop
//! ```
//!
//! # Example
//!
//! ```no_run
//! use interrogator_daq::config::DaqConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DaqConfig::load()?;
//! println!("Drop directory: {}", config.artifacts.drop_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::acquisition::AcquisitionMode;
use crate::error::{AppResult, DaqError};
use crate::ingest::layout::ArtifactLayout;
use crate::ingest::spectrum::GAIN_CALIBRATION;
use crate::session::retry::RetryPolicy;
use crate::session::SessionSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/interrogator.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Scheduling of acquisition windows
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Parameters pushed to the instrument session
    #[serde(default)]
    pub session: SessionConfig,
    /// Drop directory and artifact layout
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Timing of the acquisition loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Total run duration in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Time between the starts of consecutive windows
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Length of each armed acquisition window
    #[serde(default = "default_acq_window_ms")]
    pub acq_window_ms: u64,
    /// Which collection the session is armed for
    #[serde(default)]
    pub mode: AcquisitionMode,
}

/// Instrument session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Instrument output divider
    #[serde(default = "default_output_divider")]
    pub output_divider: u32,
    /// Maximum samples written per artifact
    #[serde(default = "default_max_samples_per_file")]
    pub max_samples_per_file: u32,
    /// Peak detection threshold in dB
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Gain setting, also indexes the amplitude calibration table
    #[serde(default = "default_gain")]
    pub gain: usize,
    /// Detection bandwidth
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,
    /// Connection attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay between connection attempts
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

/// Drop directory and artifact layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory the instrument writes artifacts into
    #[serde(default = "default_drop_dir")]
    pub drop_dir: PathBuf,
    /// Artifact file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Rows per block, one per physical channel
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Interval between exclusive-open attempts
    #[serde(default = "default_unlock_poll_ms")]
    pub unlock_poll_ms: u64,
    /// Give up waiting for an artifact after this long (unbounded when absent)
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    /// Unreadable artifacts are moved here instead of being left in the drop directory
    #[serde(default)]
    pub quarantine_dir: Option<PathBuf>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "interrogator-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_duration_ms() -> u64 {
    20_000
}

fn default_period_ms() -> u64 {
    1000
}

fn default_acq_window_ms() -> u64 {
    500
}

fn default_output_divider() -> u32 {
    10
}

fn default_max_samples_per_file() -> u32 {
    100
}

fn default_threshold() -> f64 {
    -20.0
}

fn default_gain() -> usize {
    1
}

fn default_bandwidth() -> f64 {
    60.0
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_connect_retry_delay_ms() -> u64 {
    3000
}

fn default_drop_dir() -> PathBuf {
    PathBuf::from("csvs")
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_channels() -> usize {
    4
}

fn default_unlock_poll_ms() -> u64 {
    100
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            period_ms: default_period_ms(),
            acq_window_ms: default_acq_window_ms(),
            mode: AcquisitionMode::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_divider: default_output_divider(),
            max_samples_per_file: default_max_samples_per_file(),
            threshold: default_threshold(),
            gain: default_gain(),
            bandwidth: default_bandwidth(),
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            drop_dir: default_drop_dir(),
            extension: default_extension(),
            channels: default_channels(),
            unlock_poll_ms: default_unlock_poll_ms(),
            wait_timeout_ms: None,
            quarantine_dir: None,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl DaqConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Precedence (highest to lowest): `INTERROGATOR_` environment variables,
    /// the TOML file, built-in defaults. A missing file is not an error; the
    /// defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns `DaqError::Config` if a source cannot be parsed and
    /// `DaqError::Configuration` if the merged values fail [`validate`](Self::validate).
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(DaqConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("INTERROGATOR_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level and log format are recognised
    /// - `period_ms >= acq_window_ms` and the window is non-zero
    /// - The artifact layout has at least one channel and a non-empty extension
    /// - `gain` indexes the amplitude calibration table
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let acq = &self.acquisition;
        if acq.acq_window_ms == 0 {
            return Err(DaqError::Configuration(
                "acq_window_ms must be > 0".to_string(),
            ));
        }
        if acq.period_ms < acq.acq_window_ms {
            return Err(DaqError::Configuration(format!(
                "period_ms ({}) must be >= acq_window_ms ({})",
                acq.period_ms, acq.acq_window_ms
            )));
        }

        if self.artifacts.channels == 0 {
            return Err(DaqError::Configuration(
                "artifacts.channels must be > 0".to_string(),
            ));
        }
        if self.artifacts.extension.is_empty() {
            return Err(DaqError::Configuration(
                "artifacts.extension cannot be empty".to_string(),
            ));
        }

        if self.session.gain >= GAIN_CALIBRATION.len() {
            return Err(DaqError::Configuration(format!(
                "Invalid gain {}. Must be 0-{}",
                self.session.gain,
                GAIN_CALIBRATION.len() - 1
            )));
        }
        if self.session.connect_attempts == 0 {
            return Err(DaqError::Configuration(
                "session.connect_attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Artifact layout threaded into the watcher, validator and parser.
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout {
            channels: self.artifacts.channels,
            extension: self.artifacts.extension.clone(),
        }
    }

    /// Settings passed to `HardwareSession::configure`.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            output_divider: self.session.output_divider,
            max_samples_per_file: self.session.max_samples_per_file,
            threshold: self.session.threshold,
            gain: self.session.gain,
            bandwidth: self.session.bandwidth,
            output_path: self.artifacts.drop_dir.clone(),
        }
    }

    /// Connect retry policy for the session.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.session.connect_attempts,
            backoff_delay: Duration::from_millis(self.session.connect_retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DaqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.artifacts.channels, 4);
        assert_eq!(config.artifacts.unlock_poll_ms, 100);
        assert_eq!(config.artifacts.wait_timeout_ms, None);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DaqConfig::default();
        config.application.log_level = "loud".to_string();

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_window_longer_than_period() {
        let mut config = DaqConfig::default();
        config.acquisition.period_ms = 400;
        config.acquisition.acq_window_ms = 500;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
        assert!(err.to_string().contains("must be >= acq_window_ms"));
    }

    #[test]
    fn test_gain_outside_calibration_table() {
        let mut config = DaqConfig::default();
        config.session.gain = 6;

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("Invalid gain"));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let mut config = DaqConfig::default();
        config.artifacts.channels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "interrogator.toml",
                r#"
                [acquisition]
                duration_ms = 5000
                period_ms = 1000
                acq_window_ms = 250

                [artifacts]
                drop_dir = "drop"
                wait_timeout_ms = 1500
                "#,
            )?;
            jail.set_env("INTERROGATOR_ACQUISITION__PERIOD_MS", "2000");

            let config = DaqConfig::load_from("interrogator.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.acquisition.duration_ms, 5000);
            assert_eq!(config.acquisition.period_ms, 2000);
            assert_eq!(config.acquisition.acq_window_ms, 250);
            assert_eq!(config.artifacts.drop_dir, PathBuf::from("drop"));
            assert_eq!(config.artifacts.wait_timeout_ms, Some(1500));
            assert_eq!(config.session.gain, 1);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_schedule() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "interrogator.toml",
                r#"
                [acquisition]
                period_ms = 100
                acq_window_ms = 500
                "#,
            )?;

            let result = DaqConfig::load_from("interrogator.toml");
            assert!(matches!(result, Err(DaqError::Configuration(_))));
            Ok(())
        });
    }

    #[test]
    fn test_session_settings_use_drop_dir() {
        let config = DaqConfig::default();
        let settings = config.session_settings();
        assert_eq!(settings.output_path, PathBuf::from("csvs"));
        assert_eq!(settings.gain, 1);
        assert_eq!(config.retry_policy().max_attempts, 10);
    }
}
