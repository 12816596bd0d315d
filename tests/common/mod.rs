//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod transport;

pub use transport::RecordingTransport;

use serde_json::json;
use std::sync::Arc;
use tome_core::config::{BrokerConfig, TopologyConfig};
use tome_core::messaging::{MessageBroker, StaticToggles};
use tome_core::registry::{TomeConfig, TomeRegistry};
use tome_core::state_machine::{Action, MachineConfig, StateConfig, TransitionConfig};
use tome_core::topology::ConnectionTopology;

/// Two-state machine that merges event data on every transition
pub fn door_machine() -> MachineConfig {
    MachineConfig::new("door", "closed")
        .state(
            "closed",
            StateConfig::new().on_transition("OPEN", TransitionConfig::to("open").with_action(Action::MergeEventData)),
        )
        .state(
            "open",
            StateConfig::new().on_transition("CLOSE", TransitionConfig::to("closed").with_action(Action::MergeEventData)),
        )
}

/// Self-transitioning machine that counts `TICK` events
pub fn counter_machine() -> MachineConfig {
    MachineConfig::new("counter", "counting").state(
        "counting",
        StateConfig::new().on_transition(
            "TICK",
            TransitionConfig::stay().with_action(Action::Increment {
                path: "count".to_string(),
                by: 1,
            }),
        ),
    )
}

pub fn door_tome(id: &str) -> TomeConfig {
    TomeConfig::new(id, format!("{id} tome")).machine("door", door_machine())
}

pub fn registry_with(ids: &[&str]) -> Arc<TomeRegistry> {
    let registry = Arc::new(TomeRegistry::default());
    for id in ids {
        registry.register(door_tome(id)).expect("door tome registers");
    }
    registry
}

pub fn quiet_topology_config() -> TopologyConfig {
    TopologyConfig {
        monitor_enabled: false,
        ..TopologyConfig::default()
    }
}

pub fn topology_for(registry: &Arc<TomeRegistry>) -> Arc<ConnectionTopology> {
    ConnectionTopology::new(
        Arc::clone(registry),
        Arc::new(MessageBroker::offline()),
        quiet_topology_config(),
    )
}

/// Broker whose sends land in the returned recording transport
pub fn recording_broker(status: u16) -> (Arc<MessageBroker>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::with_status(status, json!({ "ok": status < 300 })));
    let broker = Arc::new(MessageBroker::new(
        BrokerConfig::default(),
        transport.clone(),
        Arc::new(StaticToggles::new()),
    ));
    (broker, transport)
}
