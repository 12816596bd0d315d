use super::actions::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a declared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    #[default]
    Normal,
    /// Terminal state; transitions may still be declared but `is_final` reports true
    Final,
}

/// Declared state: its outgoing transitions keyed by event name and its entry actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub on: BTreeMap<String, TransitionConfig>,
    #[serde(default, rename = "type")]
    pub kind: StateKind,
    #[serde(default)]
    pub entry: Vec<Action>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn final_state() -> Self {
        Self {
            kind: StateKind::Final,
            ..Self::default()
        }
    }

    /// Declare `event` moving to `target`
    pub fn on(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.on.insert(event.into(), TransitionConfig::to(target));
        self
    }

    pub fn on_transition(mut self, event: impl Into<String>, transition: TransitionConfig) -> Self {
        self.on.insert(event.into(), transition);
        self
    }

    pub fn with_entry(mut self, action: Action) -> Self {
        self.entry.push(action);
        self
    }
}

/// Declared transition. A missing target keeps the machine in its current
/// state while still running the actions and recording history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTransition")]
pub struct TransitionConfig {
    pub target: Option<String>,
    pub actions: Vec<Action>,
}

impl TransitionConfig {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            actions: Vec::new(),
        }
    }

    /// Self-transition: stays in the current state
    pub fn stay() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Accepts either `"target"` or `{ "target": ..., "actions": [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTransition {
    Target(String),
    Full {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        actions: Vec<Action>,
    },
}

impl From<RawTransition> for TransitionConfig {
    fn from(raw: RawTransition) -> Self {
        match raw {
            RawTransition::Target(target) => Self::to(target),
            RawTransition::Full { target, actions } => Self { target, actions },
        }
    }
}
