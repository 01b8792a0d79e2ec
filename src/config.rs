//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so a missing section or key falls back to
//! the value shown in `config/default.toml`.

use serde::de::Error;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::{ObdLoggerError, Result};
use crate::obd::encoder::MAX_PARAM_DIGITS;
use crate::obd::protocol::ParameterId;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// How a request is matched with its response
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseCorrelation {
    /// Route responses by the PID they echo, bounded by `response_wait_ms`
    #[default]
    Keyed,
    /// Wait `response_wait_ms`, then take whatever arrived last
    FixedDelay,
}

/// Acquisition cycle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,

    #[serde(default)]
    pub correlation: ResponseCorrelation,

    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,
}

/// Request/response codec configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CodecConfig {
    /// Hex digit width of the extra request parameter, per parameter name
    #[serde(default)]
    pub param_digits: HashMap<String, usize>,

    /// Parameters that must never be requested
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Divide RPM by 4 as SAE J1979 specifies
    #[serde(default)]
    pub rpm_standard_scaling: bool,
}

/// Output locations
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 38400 }
fn default_timeout_ms() -> u64 { 1000 }

fn default_interval_ms() -> u64 { 1000 }
fn default_response_wait_ms() -> u64 { 200 }
fn default_parameters() -> Vec<String> {
    ParameterId::ALL.iter().map(|p| p.name().to_string()).collect()
}

fn default_log_dir() -> String { "./logs".to_string() }
fn default_snapshot_dir() -> String { "./snapshots".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            response_wait_ms: default_response_wait_ms(),
            correlation: ResponseCorrelation::default(),
            parameters: default_parameters(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use obd_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` if a value is out of range, or
    /// `UnsupportedParameter` if a parameter name is unknown.
    pub fn validate(&self) -> Result<()> {
        // Validate serial port configuration
        if self.serial.port.is_empty() {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if ![9600, 38400, 115200, 230400, 500000].contains(&self.serial.baud_rate) {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("baud_rate must be one of: 9600, 38400, 115200, 230400, 500000")
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("timeout_ms must be between 1 and 10000")
            ));
        }

        // Validate acquisition timing
        if !(1000..=1500).contains(&self.acquisition.interval_ms) {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("interval_ms must be between 1000 and 1500")
            ));
        }

        if self.acquisition.response_wait_ms == 0 || self.acquisition.response_wait_ms > 5000 {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("response_wait_ms must be between 1 and 5000")
            ));
        }

        // Validate parameter list
        if self.acquisition.parameters.is_empty() {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("parameters cannot be empty")
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.acquisition.parameters {
            let parameter: ParameterId = name.parse()?;
            if !seen.insert(parameter) {
                return Err(ObdLoggerError::Config(
                    toml::de::Error::custom(format!("parameter '{}' is listed more than once", name))
                ));
            }
        }

        // Validate codec settings
        for (name, &digits) in &self.codec.param_digits {
            name.parse::<ParameterId>()?;
            if digits > MAX_PARAM_DIGITS {
                return Err(ObdLoggerError::Config(
                    toml::de::Error::custom(format!(
                        "param_digits for '{}' must be between 0 and {}",
                        name, MAX_PARAM_DIGITS
                    ))
                ));
            }
        }

        for name in &self.codec.disabled {
            name.parse::<ParameterId>()?;
        }

        // Validate storage locations
        if self.storage.log_dir.is_empty() {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("log_dir cannot be empty")
            ));
        }

        if self.storage.snapshot_dir.is_empty() {
            return Err(ObdLoggerError::Config(
                toml::de::Error::custom("snapshot_dir cannot be empty")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 38400);
        assert_eq!(config.acquisition.interval_ms, 1000);
        assert_eq!(config.acquisition.correlation, ResponseCorrelation::Keyed);
        assert_eq!(config.acquisition.parameters, vec!["speed", "rpm", "engine_load", "maf"]);
        assert!(!config.codec.rpm_standard_scaling);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/rfcomm0"
baud_rate = 115200

[acquisition]
interval_ms = 1500
correlation = "fixed_delay"
parameters = ["rpm", "speed"]

[codec]
disabled = ["maf"]
rpm_standard_scaling = true

[codec.param_digits]
speed = 2

[storage]
log_dir = "/var/log/obd"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/rfcomm0");
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.acquisition.interval_ms, 1500);
        assert_eq!(config.acquisition.response_wait_ms, 200);
        assert_eq!(config.acquisition.correlation, ResponseCorrelation::FixedDelay);
        assert_eq!(config.codec.param_digits.get("speed"), Some(&2));
        assert_eq!(config.codec.disabled, vec!["maf"]);
        assert!(config.codec.rpm_standard_scaling);
        assert_eq!(config.storage.log_dir, "/var/log/obd");
        assert_eq!(config.storage.snapshot_dir, "./snapshots");
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"").unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.storage.log_dir, "./logs");
    }

    #[test]
    fn test_unknown_correlation_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[acquisition]\ncorrelation = \"guess\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        match Config::load("/nonexistent/obd-logger.toml") {
            Err(ObdLoggerError::Io(_)) => {}
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_zero() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_too_high() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_bounds() {
        let mut config = create_valid_config();
        config.acquisition.interval_ms = 999;
        assert!(config.validate().is_err());
        config.acquisition.interval_ms = 1501;
        assert!(config.validate().is_err());
        config.acquisition.interval_ms = 1500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_response_wait_zero() {
        let mut config = create_valid_config();
        config.acquisition.response_wait_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_parameters() {
        let mut config = create_valid_config();
        config.acquisition.parameters.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_parameter() {
        let mut config = create_valid_config();
        config.acquisition.parameters = vec!["speed".to_string(), "SPEED".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_parameter() {
        let mut config = create_valid_config();
        config.acquisition.parameters.push("coolant".to_string());
        assert!(matches!(config.validate(), Err(ObdLoggerError::UnsupportedParameter(_))));
    }

    #[test]
    fn test_param_digits_too_wide() {
        let mut config = create_valid_config();
        config.codec.param_digits.insert("rpm".to_string(), 9);
        assert!(config.validate().is_err());

        config.codec.param_digits.insert("rpm".to_string(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_disabled_parameter() {
        let mut config = create_valid_config();
        config.codec.disabled.push("oil_temp".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_storage_dirs() {
        let mut config = create_valid_config();
        config.storage.log_dir = String::new();
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.storage.snapshot_dir = String::new();
        assert!(config.validate().is_err());
    }
}
