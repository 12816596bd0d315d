//! # TomeCore Configuration System
//!
//! Typed configuration for the broker, topology, registry and logging layers.
//! Values are layered by [`ConfigManager`]: built-in defaults, then
//! `config/tome-core.yaml`, then `config/tome-core.{environment}.yaml`, then
//! `TOME__SECTION__FIELD` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tome_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().topology.health_check_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{system, toggles};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomeCoreConfig {
    pub broker: BrokerConfig,
    pub topology: TopologyConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

/// Backend endpoints and request layout for `MessageBroker::send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub primary_url: String,
    pub fallback_url: String,
    /// Path segment between the base URL and the action name
    pub path_prefix: String,
    /// Path segment for remote trace lookups
    pub trace_path: String,
    /// Toggle that selects the primary backend when enabled
    pub primary_toggle: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://localhost:8080".to_string(),
            fallback_url: "http://localhost:3001".to_string(),
            path_prefix: "api/tome".to_string(),
            trace_path: "api/trace".to_string(),
            primary_toggle: toggles::PRIMARY_BACKEND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub health_check_interval_ms: u64,
    /// How long a probe waits for a busy machine before reporting it degraded
    pub probe_timeout_ms: u64,
    pub monitor_enabled: bool,
    pub max_fan_out: usize,
    pub max_event_amplification: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: system::DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            probe_timeout_ms: system::DEFAULT_PROBE_TIMEOUT_MS,
            monitor_enabled: true,
            max_fan_out: system::MAX_FAN_OUT,
            max_event_amplification: system::MAX_EVENT_AMPLIFICATION,
        }
    }
}

impl TopologyConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Start tomes as soon as they are registered
    pub auto_start: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { auto_start: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TomeCoreConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.broker.primary_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "broker.primary_url",
                "broker configuration",
            ));
        }

        if self.broker.fallback_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "broker.fallback_url",
                "broker configuration",
            ));
        }

        if self.topology.health_check_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "topology.health_check_interval_ms",
                "0",
                "health check interval must be greater than 0",
            ));
        }

        if self.topology.probe_timeout_ms >= self.topology.health_check_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "topology.probe_timeout_ms",
                self.topology.probe_timeout_ms.to_string(),
                "probe timeout must be shorter than the health check interval",
            ));
        }

        if self.topology.max_fan_out == 0 {
            return Err(ConfigurationError::invalid_value(
                "topology.max_fan_out",
                "0",
                "fan-out threshold must be greater than 0",
            ));
        }

        Ok(())
    }
}
