//! # Traced Message Structures
//!
//! Every unit of communication recorded by the broker, plus the derived trace
//! view reconstructed from the trace index.

use crate::constants::system::{ERROR_SUFFIX, RESPONSE_SUFFIX};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which backend a message was bound for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Primary,
    Fallback,
    /// Recorded in-process without a backend call
    #[default]
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Response,
    Error,
}

impl Direction {
    /// Infer direction from the `_response` / `_error` id suffix convention
    pub fn from_message_id(id: &str) -> Self {
        if id.ends_with(RESPONSE_SUFFIX) {
            Self::Response
        } else if id.ends_with(ERROR_SUFFIX) {
            Self::Error
        } else {
            Self::Outbound
        }
    }
}

/// A recorded message; immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub trace_id: String,
    pub span_id: String,
    pub timestamp: DateTime<Utc>,
    pub backend: BackendKind,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub direction: Direction,
}

/// Optional attributes supplied to `MessageBroker::track_message`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub backend: Option<BackendKind>,
    pub action: Option<String>,
    pub data: Option<Value>,
    pub direction: Option<Direction>,
}

impl MessageMetadata {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// Reconstructed trace: messages in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceInfo {
    pub trace_id: String,
    pub messages: Vec<Message>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub backend: Option<BackendKind>,
}

impl TraceInfo {
    pub fn from_messages(trace_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            trace_id: trace_id.into(),
            start_time: messages.first().map(|m| m.timestamp),
            end_time: messages.last().map(|m| m.timestamp),
            backend: messages.first().map(|m| m.backend),
            messages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
