use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Log level for machine log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Closed set of actions a transition (or state entry) can run.
///
/// Actions execute in declaration order before the machine moves to the
/// transition target. If any action fails the whole transition is rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Set a context path to a fixed value
    Assign { path: String, value: Value },

    /// Copy the event payload, or one dotted field of it, into a context path
    AssignFromEvent {
        path: String,
        #[serde(default)]
        from: Option<String>,
    },

    /// Shallow-merge the event payload object into the context
    MergeEventData,

    /// Add `by` to a numeric context path (missing counts as zero)
    Increment {
        path: String,
        #[serde(default = "default_increment")]
        by: i64,
    },

    /// Append an entry to the machine log stack
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },

    /// Push an opaque rendering artifact onto the view stack
    EmitView { artifact: Value },

    ClearViews,

    /// Forward the event payload to a named child machine as `event`
    Delegate { child: String, event: String },

    /// Ask the broker to send `action` with the event payload to the backend
    SendMessage { action: String },
}

fn default_increment() -> i64 {
    1
}

impl Action {
    pub fn assign(path: impl Into<String>, value: Value) -> Self {
        Self::Assign {
            path: path.into(),
            value,
        }
    }

    pub fn assign_from_event(path: impl Into<String>, from: Option<&str>) -> Self {
        Self::AssignFromEvent {
            path: path.into(),
            from: from.map(str::to_string),
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    pub fn delegate(child: impl Into<String>, event: impl Into<String>) -> Self {
        Self::Delegate {
            child: child.into(),
            event: event.into(),
        }
    }

    pub fn send_message(action: impl Into<String>) -> Self {
        Self::SendMessage {
            action: action.into(),
        }
    }

    /// Get a description of this action for logging
    pub fn description(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "Assign a fixed value into the context",
            Self::AssignFromEvent { .. } => "Copy event payload into the context",
            Self::MergeEventData => "Merge event payload into the context",
            Self::Increment { .. } => "Increment a numeric context value",
            Self::Log { .. } => "Append a machine log entry",
            Self::EmitView { .. } => "Push a view artifact",
            Self::ClearViews => "Clear the view stack",
            Self::Delegate { .. } => "Delegate the event to a child machine",
            Self::SendMessage { .. } => "Request a broker send",
        }
    }
}

/// A broker send requested by a `SendMessage` action, performed by the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRequest {
    pub machine_id: String,
    pub action: String,
    pub payload: Value,
}
