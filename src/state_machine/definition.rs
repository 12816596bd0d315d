//! # Machine Definitions
//!
//! [`MachineConfig`] is the declarative, serde-friendly description of a machine.
//! [`MachineDefinition`] is its compiled form: state and event names resolved to
//! dense indices once, so dispatch at `apply` time is a table lookup on ids and
//! every transition target is known to exist.

use super::actions::Action;
use super::context::Context;
use super::errors::{invalid_definition, StateMachineResult};
use super::events::BuiltinEvent;
use super::states::{StateConfig, StateKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub type StateId = usize;
pub type EventId = usize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub initial: String,
    pub states: BTreeMap<String, StateConfig>,
    #[serde(default)]
    pub context: Context,
    /// Sub-machines created together with this machine
    #[serde(default)]
    pub children: BTreeMap<String, MachineConfig>,
}

impl MachineConfig {
    pub fn new(id: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial: initial.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn state(mut self, name: impl Into<String>, state: StateConfig) -> Self {
        self.states.insert(name.into(), state);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn child(mut self, name: impl Into<String>, config: MachineConfig) -> Self {
        self.children.insert(name.into(), config);
        self
    }
}

#[derive(Debug)]
pub(crate) struct CompiledTransition {
    pub target: StateId,
    pub actions: Vec<Action>,
}

#[derive(Debug)]
pub(crate) struct CompiledState {
    pub name: String,
    pub kind: StateKind,
    pub entry: Vec<Action>,
    pub transitions: HashMap<EventId, CompiledTransition>,
}

/// Immutable, validated machine definition shared by every instance built from it
#[derive(Debug)]
pub struct MachineDefinition {
    id: String,
    name: String,
    initial: StateId,
    initial_context: Context,
    states: Vec<CompiledState>,
    state_index: HashMap<String, StateId>,
    events: Vec<String>,
    event_index: HashMap<String, EventId>,
}

impl MachineDefinition {
    /// Validate and compile a machine configuration.
    ///
    /// Declared children are not compiled here; they are compiled when the
    /// owning [`StateMachine`](super::StateMachine) attaches them.
    pub fn compile(config: &MachineConfig) -> StateMachineResult<Arc<Self>> {
        let id = config.id.trim();
        if id.is_empty() {
            return Err(invalid_definition(&config.id, "machine id must not be empty"));
        }
        if config.states.is_empty() {
            return Err(invalid_definition(id, "at least one state must be declared"));
        }

        let state_index: HashMap<String, StateId> = config
            .states
            .keys()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let initial = *state_index.get(&config.initial).ok_or_else(|| {
            invalid_definition(id, format!("initial state '{}' is not declared", config.initial))
        })?;

        let mut events = Vec::new();
        let mut event_index: HashMap<String, EventId> = HashMap::new();
        let mut states = Vec::with_capacity(config.states.len());

        for (state_name, state) in &config.states {
            let mut transitions = HashMap::with_capacity(state.on.len());
            for (event_name, transition) in &state.on {
                if event_name.is_empty() {
                    return Err(invalid_definition(
                        id,
                        format!("state '{state_name}' declares an empty event name"),
                    ));
                }
                if BuiltinEvent::is_reserved(event_name) {
                    return Err(invalid_definition(
                        id,
                        format!("event '{event_name}' is reserved for builtin control events"),
                    ));
                }

                let source_id = state_index[state_name];
                let target = match &transition.target {
                    Some(target_name) => *state_index.get(target_name).ok_or_else(|| {
                        invalid_definition(
                            id,
                            format!(
                                "transition '{state_name}' --{event_name}--> '{target_name}' targets an undeclared state"
                            ),
                        )
                    })?,
                    None => source_id,
                };

                let event_id = *event_index.entry(event_name.clone()).or_insert_with(|| {
                    events.push(event_name.clone());
                    events.len() - 1
                });

                transitions.insert(
                    event_id,
                    CompiledTransition {
                        target,
                        actions: transition.actions.clone(),
                    },
                );
            }

            states.push(CompiledState {
                name: state_name.clone(),
                kind: state.kind,
                entry: state.entry.clone(),
                transitions,
            });
        }

        Ok(Arc::new(Self {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            initial,
            initial_context: config.context.clone(),
            states,
            state_index,
            events,
            event_index,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    pub fn initial_context(&self) -> &Context {
        &self.initial_context
    }

    pub fn state_name(&self, state: StateId) -> &str {
        &self.states[state].name
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.state_index.get(name).copied()
    }

    pub fn event_id(&self, name: &str) -> Option<EventId> {
        self.event_index.get(name).copied()
    }

    /// True when any state of this machine declares `event`
    pub fn declares_event(&self, event: &str) -> bool {
        self.event_index.contains_key(event)
    }

    /// Every event name declared anywhere in the machine, in first-seen order
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.states[state].kind == StateKind::Final
    }

    /// Events accepted from `state`
    pub fn accepted_events(&self, state: StateId) -> Vec<&str> {
        let mut accepted: Vec<&str> = self.states[state]
            .transitions
            .keys()
            .map(|event| self.events[*event].as_str())
            .collect();
        accepted.sort_unstable();
        accepted
    }

    pub(crate) fn transition(&self, state: StateId, event: EventId) -> Option<&CompiledTransition> {
        self.states[state].transitions.get(&event)
    }

    pub(crate) fn entry_actions(&self, state: StateId) -> &[Action] {
        &self.states[state].entry
    }
}
