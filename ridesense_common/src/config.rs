//! Configuration loading traits and types.
//!
//! Mirrors the teacher's `ConfigLoader` pattern: a blanket trait
//! implementation loads any `DeserializeOwned` struct from TOML, and each
//! domain struct carries its own `.validate()`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Log level for configuration.
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level verbosity.
    Trace,
    /// Debug-level verbosity.
    Debug,
    /// Info-level verbosity (default).
    Info,
    /// Warning-level verbosity.
    Warn,
    /// Error-level verbosity.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Any `DeserializeOwned` struct gets this for free via the blanket impl
/// below; domain structs add a `.validate()` method and call it after
/// `load()`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Top-level pipeline configuration, shared by the sampler and
/// warning-engine binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    pub sensors: SensorsConfig,
    pub sampler: SamplerConfig,
    pub warnings: WarningsConfig,
    pub cloud: CloudConfig,
}

impl PipelineConfig {
    /// Validate every sub-config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.sensors.validate()?;
        self.sampler.validate()?;
        self.warnings.validate()?;
        self.cloud.validate()?;
        Ok(())
    }
}

/// Fields shared across both binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl SharedConfig {
    /// No constraints today; kept for symmetry with the other sub-configs
    /// and to give future fields somewhere to validate into.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Sensor adapter selection and the bias-calibration window (C1/C2/C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorsConfig {
    /// Use the built-in simulation driver rather than a real device.
    #[serde(default = "default_true")]
    pub simulate: bool,
    /// Calibration window in seconds at startup (§4.1: "collect for 1 s").
    #[serde(default = "default_calibration_secs")]
    pub calibration_secs: f64,
    /// GNSS staleness threshold in seconds (§4.2).
    #[serde(default = "default_gnss_staleness_secs")]
    pub gnss_staleness_secs: f64,
}

impl SensorsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calibration_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "sensors.calibration_secs must be positive".into(),
            ));
        }
        if self.gnss_staleness_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "sensors.gnss_staleness_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_calibration_secs() -> f64 {
    1.0
}

fn default_gnss_staleness_secs() -> f64 {
    5.0
}

/// Fixed-rate sampler configuration (C6/C7/C8/C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    /// Target sampling rate in Hz (spec's open question: batch size of 104
    /// is authoritative, rate is configurable; default 100).
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Directory raw/ride CSV files are written into.
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,
    /// Telemetry publish cadence in seconds (§4.4).
    #[serde(default = "default_telemetry_cadence_secs")]
    pub telemetry_cadence_secs: f64,
    /// Ride controller poll cadence in seconds (§4.6).
    #[serde(default = "default_ride_poll_secs")]
    pub ride_poll_secs: f64,
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50.0..=200.0).contains(&self.rate_hz) {
            return Err(ConfigError::ValidationError(format!(
                "sampler.rate_hz {} out of plausible range 50-200",
                self.rate_hz
            )));
        }
        if self.csv_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "sampler.csv_dir cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_rate_hz() -> f64 {
    100.0
}

fn default_csv_dir() -> String {
    "./rides".to_string()
}

fn default_telemetry_cadence_secs() -> f64 {
    7.0
}

fn default_ride_poll_secs() -> f64 {
    10.0
}

/// Warning engine configuration (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarningsConfig {
    /// Path to the LSTM-style classifier weights artifact. Absent or
    /// unreadable disables the learned classifier (§4.7, §7).
    #[serde(default)]
    pub model_path: Option<String>,
    /// Per-detector poll interval in milliseconds (§5: "50-100ms").
    #[serde(default = "default_detector_poll_ms")]
    pub detector_poll_ms: u64,
}

impl WarningsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "warnings.detector_poll_ms must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

fn default_detector_poll_ms() -> u64 {
    75
}

/// Cloud backend and speed-limit endpoint configuration (C5/C8/C11).
///
/// Secrets (`password`, `api_key`) may be left empty in the TOML file and
/// supplied via `RIDESENSE_CLOUD_PASSWORD` / `RIDESENSE_SPEED_LIMIT_API_KEY`
/// environment variables instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    pub backend_base_url: String,
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub firebase_api_key: String,
    pub speed_limit_base_url: String,
    #[serde(default)]
    pub speed_limit_api_key: String,
    /// Throttle for the speed-limit fetcher, seconds per device (§4.9).
    #[serde(default = "default_speed_limit_throttle_secs")]
    pub speed_limit_throttle_secs: u64,
}

impl CloudConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "cloud.backend_base_url cannot be empty".into(),
            ));
        }
        if self.user_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "cloud.user_id cannot be empty".into(),
            ));
        }
        if self.speed_limit_throttle_secs < 50 {
            return Err(ConfigError::ValidationError(
                "cloud.speed_limit_throttle_secs must be >= 50 per §4.9".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the account password, preferring the environment variable
    /// over the TOML field so secrets need not be committed to disk.
    pub fn resolve_password(&self) -> String {
        std::env::var("RIDESENSE_CLOUD_PASSWORD").unwrap_or_else(|_| self.password.clone())
    }

    /// Resolve the speed-limit API key, same precedence as the password.
    pub fn resolve_speed_limit_api_key(&self) -> String {
        std::env::var("RIDESENSE_SPEED_LIMIT_API_KEY")
            .unwrap_or_else(|_| self.speed_limit_api_key.clone())
    }
}

fn default_speed_limit_throttle_secs() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
        [sensors]
        simulate = true

        [sampler]
        rate_hz = 100.0

        [warnings]

        [cloud]
        backend_base_url = "https://example.invalid"
        user_id = "rider1"
        email = "a@b.com"
        firebase_api_key = "key"
        speed_limit_base_url = "https://example.invalid/speed"
        "#
    }

    #[test]
    fn loads_and_validates_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();
        let cfg = PipelineConfig::load(file.path()).expect("load");
        cfg.validate().expect("validate");
        assert_eq!(cfg.sampler.rate_hz, 100.0);
        assert_eq!(cfg.cloud.speed_limit_throttle_secs, 50);
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut bad = sample_toml().to_string();
        bad.push_str("\n[shared]\nbogus_field = 1\n");
        file.write_all(bad.as_bytes()).unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_rate() {
        let mut cfg: PipelineConfig = toml::from_str(sample_toml()).unwrap();
        cfg.sampler.rate_hz = 5.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = PipelineConfig::load(Path::new("/nonexistent/path.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
