use crate::common::{quiet_topology_config, registry_with, topology_for};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tome_core::config::TopologyConfig;
use tome_core::constants::{HealthStatus, NetworkHealth};
use tome_core::messaging::MessageBroker;
use tome_core::topology::{ConnectionConfig, ConnectionTopology};

#[test]
fn test_health_check_tracks_endpoint_state() {
    let registry = registry_with(&["a", "b", "c"]);
    let topology = topology_for(&registry);
    let ab = topology.connect("a", "b", ConnectionConfig::new()).unwrap();
    let bc = topology.connect("b", "c", ConnectionConfig::new()).unwrap();

    assert_eq!(topology.network_health().status, NetworkHealth::Unknown);

    let summary = topology.run_health_check();
    assert_eq!(summary.healthy, 2);
    assert_eq!(topology.network_health().status, NetworkHealth::Healthy);
    assert!(topology.last_health_check().is_some());

    registry.stop_tome("c").unwrap();
    topology.run_health_check();
    assert_eq!(topology.get_connection(&ab).unwrap().health_status, HealthStatus::Healthy);
    assert_eq!(topology.get_connection(&bc).unwrap().health_status, HealthStatus::Degraded);
    assert_eq!(topology.network_health().status, NetworkHealth::Degraded);

    registry.unregister("c");
    topology.run_health_check();
    assert_eq!(topology.get_connection(&bc).unwrap().health_status, HealthStatus::Unhealthy);
    assert_eq!(topology.network_health().connections.unhealthy, 1);
}

#[test]
fn test_monitor_does_not_start_outside_a_runtime() {
    let registry = registry_with(&["a", "b"]);
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        TopologyConfig::default(),
    );

    topology.connect("a", "b", ConnectionConfig::new()).unwrap();

    assert!(!topology.monitor_running());
}

#[tokio::test]
async fn test_monitor_runs_while_connections_exist() {
    let registry = registry_with(&["a", "b"]);
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        TopologyConfig {
            health_check_interval_ms: 10,
            monitor_enabled: true,
            ..quiet_topology_config()
        },
    );
    assert!(!topology.monitor_running());

    let id = topology.connect("a", "b", ConnectionConfig::new()).unwrap();
    assert!(topology.monitor_running());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(topology.last_health_check().is_some());
    assert_eq!(topology.get_connection(&id).unwrap().health_status, HealthStatus::Healthy);

    topology.disconnect(&id);
    assert!(!topology.monitor_running());

    let checked_at = topology.last_health_check();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(topology.last_health_check(), checked_at);
}

#[tokio::test]
async fn test_destroy_stops_monitor_and_clears_connections() {
    let registry = registry_with(&["a", "b", "c"]);
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        TopologyConfig {
            health_check_interval_ms: 10,
            monitor_enabled: true,
            ..TopologyConfig::default()
        },
    );
    topology
        .create_network(&["a", "b", "c"], &ConnectionConfig::new())
        .unwrap();
    assert!(topology.monitor_running());

    topology.destroy();

    assert!(!topology.monitor_running());
    assert_eq!(topology.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_monitor_survives_connect_racing_last_disconnect() {
    let registry = registry_with(&["a", "b"]);
    let topology = ConnectionTopology::new(
        Arc::clone(&registry),
        Arc::new(MessageBroker::offline()),
        TopologyConfig {
            monitor_enabled: true,
            ..TopologyConfig::default()
        },
    );
    let runtime = Handle::current();

    for _ in 0..200 {
        let existing = topology.connect("a", "b", ConnectionConfig::new()).unwrap();
        assert!(topology.monitor_running());

        thread::scope(|scope| {
            scope.spawn(|| {
                let _entered = runtime.enter();
                assert!(topology.disconnect(&existing));
            });
            scope.spawn(|| {
                let _entered = runtime.enter();
                topology.connect("b", "a", ConnectionConfig::new()).unwrap();
            });
        });

        assert_eq!(topology.connection_count(), 1);
        assert!(topology.monitor_running());

        for connection in topology.get_connections() {
            topology.disconnect(&connection.id);
        }
        assert!(!topology.monitor_running());
    }
}
