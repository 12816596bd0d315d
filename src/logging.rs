//! # Structured Logging Module
//!
//! Environment-aware structured logging for the registry, broker and topology
//! layers, plus the `log_*` helpers that give every component the same field
//! layout.

use crate::config::LoggingConfig;
use crate::messaging::Direction;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults
pub fn init_structured_logging() {
    let environment = get_environment();
    init_with_config(&LoggingConfig {
        level: get_log_level(&environment),
        json: environment == "production",
    });
}

/// Initialize structured logging from configuration. `RUST_LOG` wins over
/// `config.level` when set. Safe to call more than once.
pub fn init_with_config(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

        let console = (!config.json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter())
        });
        let json = config.json.then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
        });

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(console).with(json).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            level = %config.level,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("TOME_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for tome lifecycle and dispatch operations
pub fn log_tome_operation(
    operation: &str,
    tome_id: &str,
    machine_key: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        tome_id = %tome_id,
        machine_key = machine_key,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 TOME_OPERATION"
    );
}

/// Log structured data for connection and topology operations
pub fn log_connection_operation(
    operation: &str,
    connection_id: Option<&str>,
    source_tome_id: Option<&str>,
    target_tome_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        connection_id = connection_id,
        source_tome_id = source_tome_id,
        target_tome_id = target_tome_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔗 CONNECTION_OPERATION"
    );
}

/// Log every message recorded by the broker. Debug level: the broker history
/// is the durable record.
pub fn log_broker_message(action: &str, message_id: &str, trace_id: &str, direction: Direction) {
    tracing::debug!(
        action = %action,
        message_id = %message_id,
        trace_id = %trace_id,
        direction = ?direction,
        "📨 BROKER_MESSAGE"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
