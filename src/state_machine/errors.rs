use thiserror::Error;

/// Error types for machine definition, composition and context operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid machine definition {machine_id}: {reason}")]
    InvalidDefinition { machine_id: String, reason: String },

    #[error("Child machine already registered under name: {name}")]
    DuplicateChild { name: String },

    #[error("Child machine {child_id} would create a cycle: id already used by an ancestor")]
    ChildCycle { child_id: String },

    #[error("Child machine not found: {name}")]
    ChildNotFound { name: String },

    #[error("Unknown machine node: {0}")]
    UnknownNode(usize),

    #[error("Invalid context path '{path}': {reason}")]
    InvalidContextPath { path: String, reason: String },

    #[error("Context must be a JSON object, got {found}")]
    ContextNotObject { found: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

pub fn invalid_definition(machine_id: &str, reason: impl Into<String>) -> StateMachineError {
    StateMachineError::InvalidDefinition {
        machine_id: machine_id.to_string(),
        reason: reason.into(),
    }
}

pub fn invalid_context_path(path: &str, reason: impl Into<String>) -> StateMachineError {
    StateMachineError::InvalidContextPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Error types reported by transition persistence collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Transition store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Failed to persist transition for {tome_id}/{machine_key}: {reason}")]
    WriteFailed {
        tome_id: String,
        machine_key: String,
        reason: String,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub fn write_failed(tome_id: &str, machine_key: &str, reason: impl Into<String>) -> PersistenceError {
    PersistenceError::WriteFailed {
        tome_id: tome_id.to_string(),
        machine_key: machine_key.to_string(),
        reason: reason.into(),
    }
}
