//! Application configuration management.
//!
//! Handles loading, saving, and validating nearstop configuration:
//! - Live positioning watch options
//! - Simulated feed parameters
//! - Alarm vibration pattern
//! - Wake lock and logging preferences
//!
//! Configuration is read from a TOML file and overlaid with `NEARSTOP_*`
//! environment variables (`NEARSTOP_LIVE__TIMEOUT_MS=8000`). The proximity
//! threshold is fixed and intentionally not configurable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::{PositionOptions, SimulationSettings};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "NEARSTOP";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The platform config directory could not be determined.
    #[error("Cannot determine configuration directory")]
    NoConfigDir,

    /// The file or environment could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// The config could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// The config file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A single field has an invalid value.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields have invalid values.
    #[error("Invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live positioning watch options.
    pub live: LiveConfig,
    /// Simulated feed parameters.
    pub simulation: SimulationConfig,
    /// Alarm settings.
    pub alarm: AlarmConfig,
    /// Wake lock settings.
    pub wake_lock: WakeLockConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Live positioning watch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Request the provider's most accurate mode.
    pub high_accuracy: bool,
    /// Acquisition timeout per fix, in milliseconds.
    pub timeout_ms: u64,
    /// Oldest acceptable cached fix, in milliseconds. Zero means always fresh.
    pub maximum_age_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 5000,
            maximum_age_ms: 0,
        }
    }
}

impl LiveConfig {
    /// Watch options for the live source.
    #[must_use]
    pub const fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: self.high_accuracy,
            timeout: Duration::from_millis(self.timeout_ms),
            maximum_age: Duration::from_millis(self.maximum_age_ms),
        }
    }
}

/// Simulated feed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Distance before the first tick, in meters.
    pub start_distance_m: f64,
    /// Decrease per tick, in meters.
    pub step_m: f64,
    /// Tick interval, in milliseconds.
    pub interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_distance_m: 600.0,
            step_m: 10.0,
            interval_ms: 1000,
        }
    }
}

impl SimulationConfig {
    /// Settings for the simulated source.
    #[must_use]
    pub const fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            start_distance_m: self.start_distance_m,
            step_m: self.step_m,
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

/// Alarm settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Alternating vibrate/pause durations in milliseconds.
    pub vibration_pattern_ms: Vec<u64>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            vibration_pattern_ms: vec![1000, 500, 1000],
        }
    }
}

impl AlarmConfig {
    /// The vibration pattern as durations.
    #[must_use]
    pub fn vibration_pattern(&self) -> Vec<Duration> {
        self.vibration_pattern_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

/// Wake lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeLockConfig {
    /// Try to keep the system awake while armed.
    pub enabled: bool,
}

impl Default for WakeLockConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub level: String,
    /// JSON logs to rolling files instead of pretty terminal output.
    pub production: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Reads `path` if given (it must exist), otherwise the default location
    /// if present, then applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any value
    /// is invalid.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let (path, required) = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                (path.to_path_buf(), true)
            }
            None => (default_config_path()?, false),
        };

        let config: Self = ::config::Config::builder()
            .add_source(
                ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or all of them bundled together.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.live.timeout_ms == 0 {
            invalid("live.timeout_ms", "must be greater than zero");
        }
        if self.simulation.interval_ms == 0 {
            invalid("simulation.interval_ms", "must be greater than zero");
        }
        if !self.simulation.step_m.is_finite() || self.simulation.step_m <= 0.0 {
            invalid("simulation.step_m", "must be a positive number of meters");
        }
        if !self.simulation.start_distance_m.is_finite() {
            invalid("simulation.start_distance_m", "must be a finite number");
        }
        if self.alarm.vibration_pattern_ms.is_empty() {
            invalid("alarm.vibration_pattern_ms", "must contain at least one pulse");
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            invalid("logging.level", "must be one of trace, debug, info, warn, error");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default config file location for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if no home directory can be found.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    directories::ProjectDirs::from("", "", "nearstop")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.live.position_options(), PositionOptions::default());
        assert_eq!(config.simulation.settings(), SimulationSettings::default());
        assert_eq!(
            config.alarm.vibration_pattern(),
            crate::alarm::DEFAULT_VIBRATION_PATTERN.to_vec()
        );
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[simulation]\nstart_distance_m = 700.0\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.simulation.start_distance_m, 700.0);
        assert_eq!(config.simulation.step_m, 10.0);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.live, LiveConfig::default());
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.live.timeout_ms = 8000;
        config.wake_lock.enabled = false;

        config.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.live.timeout_ms, 8000);
        assert!(!loaded.wake_lock.enabled);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.live.timeout_ms = 0;
        config.simulation.step_m = -1.0;
        config.logging.level = "loud".to_string();

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_single_error() {
        let mut config = Config::default();
        config.alarm.vibration_pattern_ms.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "alarm.vibration_pattern_ms"
        ));
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[simulation]\ninterval_ms = 0\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
