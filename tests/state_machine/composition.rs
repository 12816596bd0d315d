use crate::common::door_machine;
use serde_json::json;
use tome_core::state_machine::{
    Action, LogLevel, MachineConfig, StateConfig, StateMachine, StateMachineError, TransitionConfig,
};

fn preview_machine() -> MachineConfig {
    MachineConfig::new("preview", "stale").state(
        "stale",
        StateConfig::new().on_transition(
            "REFRESH",
            TransitionConfig::to("fresh").with_action(Action::assign_from_event("source", Some("file"))),
        ),
    )
    .state("fresh", StateConfig::new())
}

fn editor_machine() -> MachineConfig {
    MachineConfig::new("editor", "idle")
        .state(
            "idle",
            StateConfig::new().on_transition(
                "EDIT",
                TransitionConfig::to("editing")
                    .with_action(Action::log(LogLevel::Info, "editing started"))
                    .with_action(Action::delegate("preview", "REFRESH")),
            ),
        )
        .state("editing", StateConfig::new())
        .child("preview", preview_machine())
}

#[test]
fn test_delegate_drives_child_machine() {
    let mut editor = StateMachine::new(&editor_machine()).unwrap();

    editor.apply("EDIT", &json!({ "file": "notes.md" })).unwrap();

    assert_eq!(editor.state(), "editing");
    let preview = editor.child("preview").unwrap();
    assert_eq!(preview.state(), "fresh");
    assert_eq!(preview.context().get("source"), Some(&json!("notes.md")));
    assert_eq!(editor.logs().len(), 1);
}

#[test]
fn test_missing_delegate_target_rolls_back_parent() {
    let config = MachineConfig::new("orphan", "idle")
        .state(
            "idle",
            StateConfig::new().on_transition("EDIT", TransitionConfig::to("editing").with_action(Action::delegate("ghost", "X"))),
        )
        .state("editing", StateConfig::new());
    let mut machine = StateMachine::new(&config).unwrap();

    let err = machine.apply("EDIT", &json!({})).unwrap_err();

    assert_eq!(
        err,
        StateMachineError::ChildNotFound {
            name: "ghost".to_string()
        }
    );
    assert_eq!(machine.state(), "idle");
}

#[test]
fn test_child_registration_rejects_duplicates_and_cycles() {
    let mut machine = StateMachine::new(&door_machine()).unwrap();
    machine.with_child("inner", &preview_machine()).unwrap();

    assert!(matches!(
        machine.with_child("inner", &preview_machine()),
        Err(StateMachineError::DuplicateChild { .. })
    ));
    assert!(matches!(
        machine.with_child("again", &door_machine()),
        Err(StateMachineError::ChildCycle { .. })
    ));
    assert_eq!(machine.child_names(), vec!["inner"]);
}

#[test]
fn test_stop_is_idempotent() {
    let mut machine = StateMachine::new(&editor_machine()).unwrap();
    assert!(machine.is_running());

    machine.stop();
    machine.stop();
    assert!(!machine.is_running());

    machine.start();
    assert!(machine.is_running());
}
