use crate::common::{registry_with, topology_for};
use serde_json::json;
use std::sync::Arc;
use tome_core::config::{BrokerConfig, TopologyConfig};
use tome_core::constants::toggles;
use tome_core::messaging::{MessageBroker, OfflineTransport, StaticToggles};
use tome_core::topology::{ConnectionConfig, ConnectionTopology, IssueKind, StructuralConfig};

#[test]
fn test_ring_reports_cycle_warnings_but_stays_valid() {
    let registry = registry_with(&["a", "b", "c"]);
    let topology = topology_for(&registry);
    topology
        .create_network(&["a", "b", "c"], &ConnectionConfig::new())
        .unwrap();

    let validation = topology.validate_network(None);

    assert!(validation.valid);
    assert!(validation.issues.is_empty());
    for node in ["a", "b", "c"] {
        assert!(validation
            .warnings
            .contains(&format!("Circular dependency detected involving node: {node}")));
    }
}

#[test]
fn test_single_bidirectional_link_is_not_a_cycle() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);
    topology
        .connect("a", "b", ConnectionConfig::new().bidirectional())
        .unwrap();

    assert!(topology.validate_network(None).warnings.is_empty());
}

#[test]
fn test_dangling_endpoint_after_unregister_is_an_issue() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);
    topology.connect("a", "b", ConnectionConfig::new()).unwrap();
    registry.unregister("b");

    let validation = topology.validate_network(None);

    assert!(!validation.valid);
    assert_eq!(validation.issues.len(), 1);
    assert_eq!(validation.issues[0].kind, IssueKind::DanglingEndpoint);
}

#[test]
fn test_structural_config_issues_accumulate() {
    let registry = registry_with(&["a"]);
    let topology = topology_for(&registry);
    let structural: StructuralConfig = serde_json::from_value(json!({
        "routes": [
            { "path": "/editor", "tome": "a" },
            { "path": "/ghost", "tome": "ghost" }
        ],
        "navigation": [
            { "id": "home", "path": "/editor" },
            { "id": "docs", "path": "/docs" }
        ]
    }))
    .unwrap();

    let validation = topology.validate_network(Some(&structural));

    let kinds: Vec<IssueKind> = validation.issues.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![IssueKind::UnknownTome, IssueKind::UndeclaredRoute]);
    assert!(!validation.valid);
}

#[test]
fn test_fan_out_and_amplification_thresholds() {
    let registry = registry_with(&["hub", "s1", "s2", "s3"]);
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        TopologyConfig {
            monitor_enabled: false,
            max_fan_out: 2,
            max_event_amplification: 2,
            ..TopologyConfig::default()
        },
    );
    topology
        .create_hub_network("hub", &["s1", "s2", "s3"], &ConnectionConfig::new().map_event("OPEN", "OPEN"))
        .unwrap();

    let warnings = topology.validate_network(None).warnings;

    assert!(warnings.contains(&"High fan-out detected for node hub: 3 connections".to_string()));
    assert!(warnings.contains(&"Potential event amplification detected: OPEN->OPEN appears 3 times".to_string()));
}

#[test]
fn test_high_frequency_check_respects_toggle() {
    let registry = registry_with(&["a", "b"]);
    let flags = Arc::new(StaticToggles::new().with(toggles::ADVANCED_VALIDATION, true));
    let broker = Arc::new(MessageBroker::new(BrokerConfig::default(), Arc::new(OfflineTransport), flags));
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        broker,
        TopologyConfig {
            monitor_enabled: false,
            ..TopologyConfig::default()
        },
    );
    topology.connect("a", "b", ConnectionConfig::new()).unwrap();

    // Fresh connections are never flagged, even with the check enabled
    let validation = topology.validate_network(None);
    assert!(validation.valid);
    assert!(validation.warnings.iter().all(|w| !w.starts_with("High frequency")));
}
