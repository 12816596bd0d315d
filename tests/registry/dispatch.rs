use crate::common::recording_broker;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tome_core::messaging::Direction;
use tome_core::registry::{TomeConfig, TomeRegistry};
use tome_core::state_machine::{
    Action, InMemoryTransitionStore, MachineConfig, PersistedTransition, PersistenceError, PersistenceResult,
    StateConfig, TransitionConfig, TransitionPersistence,
};

/// Store that rejects every write
struct ReadOnlyStore;

#[async_trait]
impl TransitionPersistence for ReadOnlyStore {
    async fn persist_transition(&self, _transition: PersistedTransition) -> PersistenceResult<()> {
        Err(PersistenceError::StoreUnavailable("read-only replica".to_string()))
    }

    async fn resolve_current_state(&self, _tome_id: &str, _machine_key: &str) -> PersistenceResult<Option<String>> {
        Ok(None)
    }

    async fn find_transitions(&self, _tome_id: &str, _machine_key: &str) -> PersistenceResult<Vec<PersistedTransition>> {
        Ok(Vec::new())
    }
}

fn publisher_tome() -> TomeConfig {
    TomeConfig::new("publisher", "Publisher").machine(
        "doc",
        MachineConfig::new("doc", "draft")
            .state(
                "draft",
                StateConfig::new().on_transition(
                    "PUBLISH",
                    TransitionConfig::to("published").with_action(Action::send_message("publish_document")),
                ),
            )
            .state("published", StateConfig::new()),
    )
}

#[tokio::test]
async fn test_dispatch_persists_and_sends_in_one_trace() {
    let (broker, transport) = recording_broker(200);
    let store = Arc::new(InMemoryTransitionStore::new());
    let registry = TomeRegistry::default()
        .with_broker(Arc::clone(&broker))
        .with_persistence(store.clone());
    registry.register(publisher_tome()).unwrap();

    let outcome = registry
        .dispatch_tome_message("publisher", "doc", "PUBLISH", &json!({ "id": 7 }), Some("trace_publish"))
        .await
        .unwrap();

    assert_eq!(outcome.snapshot.state, "published");
    assert_eq!(outcome.trace_id, "trace_publish");
    assert_eq!(outcome.sent.len(), 1);
    assert_eq!(transport.requests().len(), 1);

    let trace = broker.get_full_trace("trace_publish");
    assert_eq!(trace.messages.len(), 2);
    assert_eq!(trace.messages[0].action, "publish_document");
    assert_eq!(trace.messages[1].direction, Direction::Response);

    assert_eq!(store.len(), 1);
    assert_eq!(
        store.resolve_current_state("publisher", "doc").await.unwrap().as_deref(),
        Some("published")
    );
}

#[tokio::test]
async fn test_failed_send_keeps_the_transition() {
    let (broker, _transport) = recording_broker(500);
    let registry = TomeRegistry::default().with_broker(Arc::clone(&broker));
    registry.register(publisher_tome()).unwrap();

    let err = registry
        .dispatch_tome_message("publisher", "doc", "PUBLISH", &json!({}), None)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "transport_error");
    assert_eq!(registry.get_machine_state("publisher", "doc").unwrap().state, "published");
    assert!(broker.message_history().iter().any(|m| m.direction == Direction::Error));
}

#[tokio::test]
async fn test_ignored_event_persists_nothing() {
    let store = Arc::new(InMemoryTransitionStore::new());
    let registry = TomeRegistry::default().with_persistence(store.clone());
    registry.register(publisher_tome()).unwrap();

    let outcome = registry
        .dispatch_tome_message("publisher", "doc", "ARCHIVE", &json!({}), None)
        .await
        .unwrap();

    assert!(outcome.outcome.is_ignored());
    assert!(outcome.trace_id.starts_with("trace_"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_write_is_reported_and_skips_sends() {
    let (broker, transport) = recording_broker(200);
    let registry = TomeRegistry::default()
        .with_broker(Arc::clone(&broker))
        .with_persistence(Arc::new(ReadOnlyStore));
    registry.register(publisher_tome()).unwrap();

    let err = registry
        .dispatch_tome_message("publisher", "doc", "PUBLISH", &json!({}), Some("trace_readonly"))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "persistence_error");
    assert!(err.to_string().contains("read-only replica"));
    assert!(transport.requests().is_empty());
    assert!(broker.get_trace_messages("trace_readonly").is_empty());
}
