// State machine module for Tome orchestration
//
// Declarative machine configurations compile into index-based definitions;
// instances keep their child machines in a flat arena owned by the root.

pub mod actions;
pub mod context;
pub mod definition;
pub mod errors;
pub mod events;
pub mod machine;
pub mod persistence;
pub mod states;

// Re-export main types for convenient access
pub use actions::{Action, LogLevel, OutboundRequest};
pub use context::Context;
pub use definition::{MachineConfig, MachineDefinition};
pub use errors::{PersistenceError, PersistenceResult, StateMachineError, StateMachineResult};
pub use events::BuiltinEvent;
pub use machine::{
    ApplyOutcome, ApplyResult, LogEntry, MachineSnapshot, MachineView, NodeId, StateMachine,
    TransitionRecord, ROOT,
};
pub use persistence::{InMemoryTransitionStore, PersistedTransition, TransitionPersistence};
pub use states::{StateConfig, StateKind, TransitionConfig};
