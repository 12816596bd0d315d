use crate::common::{registry_with, topology_for};
use std::thread;
use tome_core::topology::ConnectionConfig;
use tome_core::TomeError;

#[test]
fn test_ring_creates_one_connection_per_tome() {
    let registry = registry_with(&["a", "b", "c", "d"]);
    let topology = topology_for(&registry);

    let ids = topology
        .create_network(&["a", "b", "c", "d"], &ConnectionConfig::new())
        .unwrap();

    assert_eq!(ids.len(), 4);
    let pairs: Vec<(String, String)> = topology
        .get_connections()
        .into_iter()
        .map(|c| (c.source_tome_id, c.target_tome_id))
        .collect();
    assert_eq!(pairs.last(), Some(&("d".to_string(), "a".to_string())));
    assert_eq!(topology.get_network_topology().nodes.len(), 4);
}

#[test]
fn test_ring_needs_two_tomes() {
    let registry = registry_with(&["a"]);
    let topology = topology_for(&registry);

    let err = topology.create_network(&["a"], &ConnectionConfig::new()).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Validation error: At least 2 tomes are required for ring network"
    );
}

#[test]
fn test_hub_creates_one_connection_per_spoke() {
    let registry = registry_with(&["hub", "s1", "s2", "s3"]);
    let topology = topology_for(&registry);

    let ids = topology
        .create_hub_network("hub", &["s1", "s2", "s3"], &ConnectionConfig::new().bidirectional())
        .unwrap();

    assert_eq!(ids.len(), 3);
    assert_eq!(topology.connections_for_tome("hub").len(), 3);
    assert_eq!(topology.connections_for_tome("s2").len(), 1);
    assert!(topology.get_connections().iter().all(|c| c.bidirectional));
}

#[test]
fn test_bulk_build_with_unknown_tome_creates_nothing() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);

    let result = topology.create_network(&["a", "b", "ghost"], &ConnectionConfig::new());

    assert!(matches!(result, Err(TomeError::Validation(_))));
    assert_eq!(topology.connection_count(), 0);
}

#[test]
fn test_connect_validates_mapping_endpoints() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);

    assert!(topology.connect("", "b", ConnectionConfig::new()).is_err());
    assert!(topology
        .connect("a", "b", ConnectionConfig::new().with_target_machine("ghost"))
        .is_err());
    assert!(topology
        .connect("a", "b", ConnectionConfig::new().map_field("door.by", "nowhere"))
        .is_err());
    assert_eq!(topology.connection_count(), 0);
}

#[test]
fn test_disconnect_is_idempotent_and_traced() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);
    let id = topology.connect("a", "b", ConnectionConfig::new()).unwrap();

    assert!(topology.disconnect(&id));
    assert!(!topology.disconnect(&id));
    assert!(topology.get_connection(&id).is_none());

    let created = topology.broker().get_message(&id).unwrap();
    assert_eq!(created.action, "connection_created");
    let removed = topology.broker().get_message(&format!("disconnect_{id}")).unwrap();
    assert_eq!(removed.action, "connection_disconnected");
    assert_eq!(removed.payload["source"], "a");
}

#[test]
fn test_custom_trace_id_is_kept() {
    let registry = registry_with(&["a", "b"]);
    let topology = topology_for(&registry);

    let id = topology
        .connect("a", "b", ConnectionConfig::new().with_trace_id("trace_custom"))
        .unwrap();

    assert_eq!(topology.get_connection(&id).unwrap().trace_id, "trace_custom");
    assert_eq!(topology.broker().get_message(&id).unwrap().trace_id, "trace_custom");
}

#[test]
fn test_ring_is_all_or_nothing_under_concurrent_unregister() {
    let members = ["a", "b", "c", "d", "e", "f"];
    for _ in 0..200 {
        let registry = registry_with(&members);
        let topology = topology_for(&registry);

        let result = thread::scope(|scope| {
            let build = scope.spawn(|| topology.create_network(&members, &ConnectionConfig::new()));
            let remove = scope.spawn(|| registry.unregister("f"));
            assert!(remove.join().unwrap());
            build.join().unwrap()
        });

        match result {
            Ok(ids) => {
                assert_eq!(ids.len(), members.len());
                assert_eq!(topology.connection_count(), members.len());
            }
            Err(err) => {
                assert!(matches!(err, TomeError::Validation(_)));
                assert_eq!(topology.connection_count(), 0);
                assert!(topology.get_network_topology().nodes.is_empty());
            }
        }
    }
}
