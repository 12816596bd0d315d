//! # System Constants
//!
//! Header names, feature-toggle names, tracked message actions and the health
//! enums shared by the registry, broker and topology layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trace propagation headers attached to every outbound broker call
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const TRACE_ID: &str = "x-trace-id";
    pub const SPAN_ID: &str = "x-span-id";
    pub const MESSAGE_ID: &str = "x-message-id";

    // Vendor tracing headers, only sent when the vendor toggle is on
    pub const DATADOG_TRACE_ID: &str = "x-datadog-trace-id";
    pub const DATADOG_PARENT_ID: &str = "x-datadog-parent-id";
    pub const DATADOG_SAMPLING_PRIORITY: &str = "x-datadog-sampling-priority";
}

/// Feature toggle names consulted through the injected evaluator
pub mod toggles {
    pub const PRIMARY_BACKEND: &str = "use-primary-backend";
    pub const VENDOR_HEADERS: &str = "enable-datadog";
    pub const ADVANCED_VALIDATION: &str = "enable-advanced-validation";
}

/// Actions recorded by the topology layer through `MessageBroker::track_message`
pub mod actions {
    pub const CONNECTION_CREATED: &str = "connection_created";
    pub const CONNECTION_DISCONNECTED: &str = "connection_disconnected";
    pub const EVENT_BROADCASTED: &str = "event_broadcasted";
    pub const EVENT_FORWARDED: &str = "event_forwarded";
    pub const STATE_SYNCHRONIZED: &str = "state_synchronized";
    pub const HEALTH_CHECK: &str = "health_check";
    pub const API_CONNECTION_CREATED: &str = "connection_created_via_api";
}

/// Identifier prefixes
pub mod id_prefixes {
    pub const MESSAGE: &str = "msg";
    pub const TRACE: &str = "trace";
    pub const SPAN: &str = "span";
    pub const CONNECTION: &str = "connection";
    pub const LOG: &str = "log";
}

/// Operational defaults
pub mod system {
    pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 30_000;
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 50;
    pub const MAX_FAN_OUT: usize = 10;
    pub const MAX_EVENT_AMPLIFICATION: usize = 5;
    pub const HIGH_FREQUENCY_MIN_AGE_SECONDS: i64 = 60;
    pub const HIGH_FREQUENCY_MAX_IDLE_MS: i64 = 1_000;
    pub const RESPONSE_SUFFIX: &str = "_response";
    pub const ERROR_SUFFIX: &str = "_error";
}

/// Health of a single connection, recomputed only by the monitor cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Aggregate health across every connection in a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
    NoConnections,
}

impl NetworkHealth {
    /// Fold individual connection statuses into the network status
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let (mut total, mut healthy, mut unhealthy, mut unknown) = (0usize, 0usize, 0usize, 0usize);
        for status in statuses {
            total += 1;
            match status {
                HealthStatus::Healthy => healthy += 1,
                HealthStatus::Unhealthy => unhealthy += 1,
                HealthStatus::Unknown => unknown += 1,
                HealthStatus::Degraded => {}
            }
        }

        match total {
            0 => Self::NoConnections,
            t if healthy == t => Self::Healthy,
            t if unhealthy == t => Self::Unhealthy,
            t if unknown == t => Self::Unknown,
            _ => Self::Degraded,
        }
    }
}

impl fmt::Display for NetworkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
            Self::NoConnections => write!(f, "no-connections"),
        }
    }
}
