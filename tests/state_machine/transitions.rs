use crate::common::{counter_machine, door_machine};
use serde_json::json;
use tome_core::state_machine::{
    Action, ApplyOutcome, BuiltinEvent, MachineConfig, StateConfig, StateMachine, StateMachineError, TransitionConfig,
    ROOT,
};

#[test]
fn test_declared_event_transitions_and_records_history() {
    let mut machine = StateMachine::new(&door_machine()).unwrap();

    let result = machine.apply("OPEN", &json!({ "by": "alice" })).unwrap();

    assert_eq!(
        result.outcome,
        ApplyOutcome::Transitioned {
            from: "closed".to_string(),
            to: "open".to_string()
        }
    );
    assert_eq!(machine.state(), "open");
    assert_eq!(machine.context_value("by"), Some(&json!("alice")));
    assert_eq!(machine.history().len(), 1);
    assert_eq!(machine.history()[0].from_state, "closed");
    assert_eq!(machine.history()[0].to_state, "open");
}

#[test]
fn test_undeclared_event_is_ignored_without_history() {
    let mut machine = StateMachine::new(&door_machine()).unwrap();

    let result = machine.apply("CLOSE", &json!({})).unwrap();

    assert!(result.outcome.is_ignored());
    assert_eq!(machine.state(), "closed");
    assert!(machine.history().is_empty());
}

#[test]
fn test_self_transition_still_counts_as_history() {
    let mut machine = StateMachine::new(&counter_machine()).unwrap();
    for _ in 0..3 {
        machine.apply("TICK", &json!(null)).unwrap();
    }

    assert_eq!(machine.state(), "counting");
    assert_eq!(machine.context_value("count"), Some(&json!(3)));
    assert_eq!(machine.history().len(), 3);
}

#[test]
fn test_builtin_events_never_touch_history() {
    let mut machine = StateMachine::new(&door_machine()).unwrap();

    let result = machine
        .apply("SYNC_STATE", &json!({ "updates": { "color": "red" } }))
        .unwrap();
    assert_eq!(result.outcome, ApplyOutcome::Builtin);
    machine.apply_builtin(ROOT, &BuiltinEvent::HealthPing).unwrap();

    assert_eq!(machine.context_value("color"), Some(&json!("red")));
    assert_eq!(machine.state(), "closed");
    assert!(machine.history().is_empty());
}

#[test]
fn test_failed_action_rolls_back_transition() {
    let config = MachineConfig::new("strict", "a")
        .with_context(json!({ "label": "text" }).as_object().cloned().unwrap())
        .state(
            "a",
            StateConfig::new().on_transition(
                "GO",
                TransitionConfig::to("b")
                    .with_action(Action::assign("visited", json!(true)))
                    .with_action(Action::Increment {
                        path: "label".to_string(),
                        by: 1,
                    }),
            ),
        )
        .state("b", StateConfig::new());
    let mut machine = StateMachine::new(&config).unwrap();

    let err = machine.apply("GO", &json!({})).unwrap_err();

    assert!(matches!(err, StateMachineError::InvalidContextPath { .. }));
    assert_eq!(machine.state(), "a");
    assert_eq!(machine.context_value("visited"), None);
    assert!(machine.history().is_empty());
}

#[test]
fn test_send_message_action_fills_outbox() {
    let config = MachineConfig::new("notifier", "idle").state(
        "idle",
        StateConfig::new().on_transition("PING", TransitionConfig::stay().with_action(Action::send_message("notify"))),
    );
    let mut machine = StateMachine::new(&config).unwrap();

    let result = machine.apply("PING", &json!({ "n": 1 })).unwrap();

    assert_eq!(result.outbox.len(), 1);
    assert_eq!(result.outbox[0].action, "notify");
    assert_eq!(result.outbox[0].machine_id, "notifier");
    assert_eq!(result.outbox[0].payload, json!({ "n": 1 }));
}

#[test]
fn test_definition_rejects_reserved_and_dangling_events() {
    let reserved = MachineConfig::new("m", "a").state("a", StateConfig::new().on("HEALTH_PING", "a"));
    assert!(matches!(
        StateMachine::new(&reserved),
        Err(StateMachineError::InvalidDefinition { .. })
    ));

    let dangling = MachineConfig::new("m", "a").state("a", StateConfig::new().on("GO", "nowhere"));
    assert!(matches!(
        StateMachine::new(&dangling),
        Err(StateMachineError::InvalidDefinition { .. })
    ));

    let no_initial = MachineConfig::new("m", "missing").state("a", StateConfig::new());
    assert!(StateMachine::new(&no_initial).is_err());
}

#[test]
fn test_machine_config_deserializes_from_json() {
    let config: MachineConfig = serde_json::from_value(json!({
        "id": "light",
        "initial": "off",
        "states": {
            "off": { "on": { "TOGGLE": "on" } },
            "on": { "on": { "TOGGLE": { "target": "off", "actions": [{ "type": "increment", "path": "cycles" }] } } }
        }
    }))
    .unwrap();
    let mut machine = StateMachine::new(&config).unwrap();

    machine.apply("TOGGLE", &json!({})).unwrap();
    machine.apply("TOGGLE", &json!({})).unwrap();

    assert_eq!(machine.state(), "off");
    assert_eq!(machine.context_value("cycles"), Some(&json!(1)));
}
