/*!
 * Configuration management for accessim.
 *
 * Settings are layered: built-in defaults, then an optional TOML file, then
 * environment variables (`ACCESSIM__SECTION__KEY`).
 */
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::ProtocolVersion;

/// Environment variable prefix used by [`ConfigBuilder::with_default_environment`]
pub const ENV_PREFIX: &str = "accessim";

/// Simulator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Host-side negotiation preferences
    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Environmental sensor simulation
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Input controller simulation
    #[serde(default)]
    pub input: InputConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to print the event target
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

/// Negotiation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Protocol version the host asks for when connecting
    #[serde(default = "default_requested_version")]
    pub requested_version: ProtocolVersion,
}

/// Environmental sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Maximum number of retained log entries
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Minimum time between two simulated drift steps
    #[serde(default = "default_drift_interval_ms")]
    pub drift_interval_ms: u64,

    /// Seed for the drift random walk
    #[serde(default = "default_sensor_seed")]
    pub seed: u64,
}

/// Input controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Seed for simulated button and stick noise
    #[serde(default = "default_input_seed")]
    pub seed: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_with_target(),
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            requested_version: default_requested_version(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            drift_interval_ms: default_drift_interval_ms(),
            seed: default_sensor_seed(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            seed: default_input_seed(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

fn default_requested_version() -> ProtocolVersion {
    ProtocolVersion::V2
}

fn default_log_capacity() -> usize {
    100
}

fn default_drift_interval_ms() -> u64 {
    5_000
}

fn default_sensor_seed() -> u64 {
    0x5e45
}

fn default_input_seed() -> u64 {
    0x1a9c
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Read environment variables under [`ENV_PREFIX`]
    pub fn with_default_environment(self) -> Self {
        self.with_environment_prefix(ENV_PREFIX)
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let default_config = Config::default();
        let mut config_builder = ConfigLib::builder().add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::from(path));
            } else {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        if config.sensor.log_capacity == 0 {
            return Err(Error::config("sensor.log_capacity must be at least 1"));
        }

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.negotiation.requested_version, ProtocolVersion::V2);
        assert_eq!(config.sensor.log_capacity, 100);
        assert_eq!(config.sensor.drift_interval_ms, 5_000);
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = assert_ok!(ConfigBuilder::new().build());
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.with_target);
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("accessim.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [logging]
                level = "debug"

                [negotiation]
                requested_version = "aoav1"

                [sensor]
                log_capacity = 3
                drift_interval_ms = 0
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(&file_path).build()?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.negotiation.requested_version, ProtocolVersion::V1);
        assert_eq!(config.sensor.log_capacity, 3);
        assert_eq!(config.sensor.drift_interval_ms, 0);
        assert_eq!(config.input.seed, default_input_seed());

        Ok(())
    }

    #[test]
    fn test_config_builder_missing_file() {
        let result = ConfigBuilder::new()
            .with_config_file("/nonexistent/accessim.toml")
            .build();
        assert!(matches!(assert_err!(result), Error::Config(_)));
    }

    #[test]
    fn test_config_builder_rejects_zero_capacity() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("accessim.toml");
        std::fs::write(&file_path, "[sensor]\nlog_capacity = 0\n")?;

        let result = ConfigBuilder::new().with_config_file(&file_path).build();
        assert!(matches!(result, Err(Error::Config(_))));
        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("ACCESSIMTEST__LOGGING__LEVEL", "trace");
        env::set_var("ACCESSIMTEST__SENSOR__SEED", "7");

        let config = ConfigBuilder::new()
            .with_environment_prefix("accessimtest")
            .build()?;

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.sensor.seed, 7);

        env::remove_var("ACCESSIMTEST__LOGGING__LEVEL");
        env::remove_var("ACCESSIMTEST__SENSOR__SEED");

        Ok(())
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let shared2 = shared.clone();
        assert_eq!(shared2.get().logging.level, "info");
        assert_eq!(shared.as_ref().sensor.log_capacity, 100);
    }
}
