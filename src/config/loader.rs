//! Configuration Loader
//!
//! Environment-aware layering on top of the `config` crate. Handles file
//! discovery, environment detection and `TOME__` variable overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::TomeCoreConfig;
use config::{Config, Environment, File, Map};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE: &str = "tome-core.yaml";
const ENV_PREFIX: &str = "TOME";
const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    config: TomeCoreConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Process environment variables prefixed `TOME__` still apply.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layered(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`] but reads variable
    /// overrides from `overrides` instead of the process environment
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Map<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layered(config_dir, environment, Some(overrides))
    }

    fn load_layered(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let defaults = Config::try_from(&TomeCoreConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let config: TomeCoreConfig = Config::builder()
            .add_source(defaults)
            .add_source(File::from(config_directory.join(BASE_FILE)).required(false))
            .add_source(File::from(Self::environment_file(&config_directory, environment)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(overrides),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            health_check_interval_ms = config.topology.health_check_interval_ms,
            primary_url = %config.broker.primary_url,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Build a manager around an already constructed configuration
    pub fn from_config(config: TomeCoreConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TomeCoreConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: TOME_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("TOME_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn environment_file(config_directory: &Path, environment: &str) -> PathBuf {
        config_directory.join(format!("tome-core.{environment}.yaml"))
    }
}
