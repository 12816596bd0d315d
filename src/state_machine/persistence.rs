use super::errors::PersistenceResult;
use super::machine::TransitionRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A transition as handed to a persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTransition {
    pub tome_id: String,
    pub machine_key: String,
    pub event: String,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl PersistedTransition {
    pub fn from_record(tome_id: &str, machine_key: &str, record: &TransitionRecord) -> Self {
        Self {
            tome_id: tome_id.to_string(),
            machine_key: machine_key.to_string(),
            event: record.event.clone(),
            from_state: record.from_state.clone(),
            to_state: record.to_state.clone(),
            timestamp: record.timestamp,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Trait for persisting state transitions.
///
/// Orchestration never reads from it; it exists so an embedding application
/// can plug its own store behind the registry.
#[async_trait]
pub trait TransitionPersistence: Send + Sync {
    /// Persist a state transition
    async fn persist_transition(&self, transition: PersistedTransition) -> PersistenceResult<()>;

    /// Resolve the most recent persisted state of a machine
    async fn resolve_current_state(&self, tome_id: &str, machine_key: &str) -> PersistenceResult<Option<String>>;

    /// Every persisted transition for a machine, oldest first
    async fn find_transitions(&self, tome_id: &str, machine_key: &str) -> PersistenceResult<Vec<PersistedTransition>>;
}

/// In-memory transition log keyed by `(tome_id, machine_key)`
#[derive(Debug, Default)]
pub struct InMemoryTransitionStore {
    transitions: DashMap<(String, String), Vec<PersistedTransition>>,
}

impl InMemoryTransitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transitions.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TransitionPersistence for InMemoryTransitionStore {
    async fn persist_transition(&self, transition: PersistedTransition) -> PersistenceResult<()> {
        self.transitions
            .entry((transition.tome_id.clone(), transition.machine_key.clone()))
            .or_default()
            .push(transition);
        Ok(())
    }

    async fn resolve_current_state(&self, tome_id: &str, machine_key: &str) -> PersistenceResult<Option<String>> {
        Ok(self
            .transitions
            .get(&(tome_id.to_string(), machine_key.to_string()))
            .and_then(|entries| entries.last().map(|t| t.to_state.clone())))
    }

    async fn find_transitions(&self, tome_id: &str, machine_key: &str) -> PersistenceResult<Vec<PersistedTransition>> {
        Ok(self
            .transitions
            .get(&(tome_id.to_string(), machine_key.to_string()))
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }
}
