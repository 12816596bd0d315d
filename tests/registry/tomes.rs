use crate::common::{counter_machine, door_machine, door_tome, registry_with};
use serde_json::json;
use std::time::Duration;
use tome_core::config::RegistryConfig;
use tome_core::constants::HealthStatus;
use tome_core::registry::{TomeConfig, TomeRegistry};
use tome_core::TomeError;

#[test]
fn test_registration_order_and_stats() {
    let registry = TomeRegistry::default();
    registry
        .register(door_tome("b").machine("counter", counter_machine()))
        .unwrap();
    registry.register(door_tome("a")).unwrap();

    assert_eq!(registry.list_tomes(), vec!["b".to_string(), "a".to_string()]);
    let stats = registry.stats();
    assert_eq!(stats.total_tomes, 2);
    assert_eq!(stats.running_tomes, 2);
    assert_eq!(stats.total_machines, 3);

    let statuses = registry.get_tome_status();
    assert_eq!(statuses[0].id, "b");
    assert_eq!(statuses[0].machines["counter"].state, "counting");
}

#[test]
fn test_duplicate_and_empty_tomes_are_rejected() {
    let registry = registry_with(&["editor"]);

    assert!(matches!(registry.register(door_tome("editor")), Err(TomeError::Validation(_))));
    assert!(matches!(
        registry.register(TomeConfig::new("empty", "No machines")),
        Err(TomeError::Validation(_))
    ));
    assert_eq!(registry.tome_count(), 1);
}

#[test]
fn test_unknown_lookups_are_not_found() {
    let registry = registry_with(&["editor"]);

    assert!(registry.get_tome("ghost").unwrap_err().is_not_found());
    assert!(registry
        .send_tome_message("editor", "ghost", "OPEN", &json!({}))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_shared_context_reaches_every_machine() {
    let registry = TomeRegistry::default();
    registry
        .register(
            TomeConfig::new("workspace", "Workspace")
                .machine("door", door_machine())
                .machine("counter", counter_machine())
                .with_context(json!({ "owner": "ops" }).as_object().cloned().unwrap()),
        )
        .unwrap();

    assert_eq!(
        registry.machine_context_value("workspace", "counter", "owner").unwrap(),
        Some(json!("ops"))
    );

    let updates = json!({ "theme": "dark" }).as_object().cloned().unwrap();
    registry.update_tome_context("workspace", &updates).unwrap();

    for machine in ["door", "counter"] {
        assert_eq!(
            registry.machine_context_value("workspace", machine, "theme").unwrap(),
            Some(json!("dark"))
        );
    }
}

#[test]
fn test_stopped_tome_rejects_messages_and_probes_degraded() {
    let registry = TomeRegistry::new(RegistryConfig { auto_start: false });
    registry.register(door_tome("editor")).unwrap();

    assert!(registry.send_tome_message("editor", "door", "OPEN", &json!({})).is_err());
    assert_eq!(registry.probe("editor", Duration::from_millis(10)).status, HealthStatus::Degraded);

    registry.start_tome("editor").unwrap();
    let snapshot = registry.send_tome_message("editor", "door", "OPEN", &json!({})).unwrap();
    assert_eq!(snapshot.state, "open");
    assert_eq!(registry.probe("editor", Duration::from_millis(10)).status, HealthStatus::Healthy);

    registry.stop_tome("editor").unwrap();
    registry.stop_tome("editor").unwrap();
    assert!(!registry.get_tome("editor").unwrap().is_running());
}

#[test]
fn test_unregister_is_idempotent() {
    let registry = registry_with(&["editor"]);

    assert!(registry.unregister("editor"));
    assert!(!registry.unregister("editor"));
    assert_eq!(
        registry.probe("editor", Duration::from_millis(10)).status,
        HealthStatus::Unhealthy
    );
}
