//! # Builtin Events
//!
//! Reserved control events handled ahead of a machine's own transitions.
//!
//! ```rust
//! use serde_json::json;
//! use tome_core::state_machine::{ApplyOutcome, MachineConfig, StateConfig, StateMachine};
//!
//! let mut machine = StateMachine::new(&MachineConfig::new("door", "closed").state("closed", StateConfig::new()))?;
//! let result = machine.apply("SYNC_STATE", &json!({ "updates": { "owner": "ana" } }))?;
//!
//! assert_eq!(result.outcome, ApplyOutcome::Builtin);
//! assert_eq!(result.snapshot.context["owner"], json!("ana"));
//! assert!(machine.history().is_empty());
//! # Ok::<(), tome_core::state_machine::StateMachineError>(())
//! ```

use super::context::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control events every machine accepts regardless of its current state.
///
/// Their wire names are reserved: a machine definition may not declare a
/// transition on them. They never produce transition-history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BuiltinEvent {
    /// Shallow-merge the given updates into the context
    #[serde(rename = "SYNC_STATE")]
    SyncState(Context),
    /// Reachability probe; reads state without touching it
    #[serde(rename = "HEALTH_PING")]
    HealthPing,
}

pub const SYNC_STATE: &str = "SYNC_STATE";
pub const HEALTH_PING: &str = "HEALTH_PING";

impl BuiltinEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SyncState(_) => SYNC_STATE,
            Self::HealthPing => HEALTH_PING,
        }
    }

    pub fn is_reserved(name: &str) -> bool {
        matches!(name, SYNC_STATE | HEALTH_PING)
    }

    /// Build a builtin from an event name and payload, if the name is reserved.
    ///
    /// `SYNC_STATE` takes its updates from `data.updates` when present, otherwise
    /// from the payload object itself.
    pub fn from_wire(name: &str, data: &Value) -> Option<Self> {
        match name {
            SYNC_STATE => {
                let updates = data
                    .get("updates")
                    .and_then(Value::as_object)
                    .or_else(|| data.as_object())
                    .cloned()
                    .unwrap_or_default();
                Some(Self::SyncState(updates))
            }
            HEALTH_PING => Some(Self::HealthPing),
            _ => None,
        }
    }
}
