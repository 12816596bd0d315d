//! # Crate Error Types
//!
//! Top-level error taxonomy. Module-specific errors (`StateMachineError`,
//! `PersistenceError`, `MessagingError`, `ConfigurationError`) fold into [`TomeError`] via `#[from]`.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::state_machine::{PersistenceError, StateMachineError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TomeError {
    /// Missing or malformed required input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown tome id, machine key or connection id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// No routing-table entry matches method + path
    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// The underlying backend call failed
    #[error("Transport error: {0}")]
    Transport(#[from] MessagingError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    /// The transition persistence collaborator rejected a write
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TomeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn route_not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Stable, machine-readable error category for response envelopes
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::Transport(_) => "transport_error",
            Self::StateMachine(_) => "state_machine_error",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::RouteNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, TomeError>;
