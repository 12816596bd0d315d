//! # State Machine Instances
//!
//! A [`StateMachine`] is a root machine plus every descendant machine, stored
//! flat in an arena. Nodes reference their parent by [`NodeId`] and their
//! children by name, so composition never needs nested ownership and cycle
//! checks are a walk up the parent chain.
//!
//! `apply` on a node runs the declared transition actions in order, moves to
//! the target state, then runs the target's entry actions when the state
//! changed. If any action fails the whole arena is restored to the snapshot
//! taken before the event, so a failed transition leaves no partial effects.

use super::actions::{Action, LogLevel, OutboundRequest};
use super::context::{self, Context};
use super::definition::{MachineConfig, MachineDefinition, StateId};
use super::errors::{invalid_context_path, StateMachineError, StateMachineResult};
use super::events::BuiltinEvent;
use crate::constants::id_prefixes;
use crate::messaging::ids::generate_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub type NodeId = usize;

/// Arena index of the root machine
pub const ROOT: NodeId = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub from_state: String,
    pub to_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub metadata: Value,
}

/// `{state, context}` view of a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub state: String,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// A declared transition ran (including self-transitions)
    Transitioned { from: String, to: String },
    /// The event is not declared for the current state; nothing changed
    Ignored,
    /// A builtin control event was handled
    Builtin,
}

impl ApplyOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub snapshot: MachineSnapshot,
    pub outcome: ApplyOutcome,
    /// Broker sends requested by `SendMessage` actions, in execution order
    pub outbox: Vec<OutboundRequest>,
}

#[derive(Debug, Clone)]
struct MachineNode {
    definition: Arc<MachineDefinition>,
    name: Option<String>,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    state: StateId,
    context: Context,
    history: Vec<TransitionRecord>,
    logs: Vec<LogEntry>,
    views: Vec<Value>,
    running: bool,
}

impl MachineNode {
    fn new(
        definition: Arc<MachineDefinition>,
        name: Option<String>,
        parent: Option<NodeId>,
        context: Context,
    ) -> Self {
        Self {
            state: definition.initial_state(),
            definition,
            name,
            parent,
            children: BTreeMap::new(),
            context,
            history: Vec::new(),
            logs: Vec::new(),
            views: Vec::new(),
            running: true,
        }
    }

    fn state_name(&self) -> &str {
        self.definition.state_name(self.state)
    }

    fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            state: self.state_name().to_string(),
            context: Value::Object(self.context.clone()),
        }
    }

    fn push_log(&mut self, level: LogLevel, message: impl Into<String>, metadata: Value) {
        self.logs.push(LogEntry {
            id: generate_id(id_prefixes::LOG),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            metadata,
        });
    }
}

/// Read-only handle to one node of a machine arena
#[derive(Debug, Clone, Copy)]
pub struct MachineView<'a> {
    node_id: NodeId,
    node: &'a MachineNode,
}

impl<'a> MachineView<'a> {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn id(&self) -> &'a str {
        self.node.definition.id()
    }

    /// Name this node is registered under in its parent, `None` for the root
    pub fn name(&self) -> Option<&'a str> {
        self.node.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.node.parent
    }

    pub fn state(&self) -> &'a str {
        self.node.state_name()
    }

    pub fn context(&self) -> &'a Context {
        &self.node.context
    }

    pub fn history(&self) -> &'a [TransitionRecord] {
        &self.node.history
    }

    pub fn logs(&self) -> &'a [LogEntry] {
        &self.node.logs
    }

    pub fn views(&self) -> &'a [Value] {
        &self.node.views
    }

    pub fn children(&self) -> impl Iterator<Item = (&'a str, NodeId)> {
        self.node.children.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn is_running(&self) -> bool {
        self.node.running
    }

    pub fn is_final(&self) -> bool {
        self.node.definition.is_final(self.node.state)
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        self.node.snapshot()
    }
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    nodes: Vec<MachineNode>,
}

impl StateMachine {
    /// Build a machine (and its declared children) from configuration
    pub fn new(config: &MachineConfig) -> StateMachineResult<Self> {
        Self::with_shared_context(config, &Context::new())
    }

    /// Build a machine whose context starts from `shared`, overridden by the
    /// machine's own declared context
    pub fn with_shared_context(config: &MachineConfig, shared: &Context) -> StateMachineResult<Self> {
        let definition = MachineDefinition::compile(config)?;
        let mut context = shared.clone();
        context::merge_shallow(&mut context, definition.initial_context());

        let mut machine = Self {
            nodes: vec![MachineNode::new(definition, None, None, context)],
        };
        for (name, child) in &config.children {
            machine.with_child_at(ROOT, name, child)?;
        }
        Ok(machine)
    }

    pub fn id(&self) -> &str {
        self.root().definition.id()
    }

    pub fn name(&self) -> &str {
        self.root().definition.name()
    }

    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.root().definition
    }

    pub fn state(&self) -> &str {
        self.root().state_name()
    }

    pub fn context(&self) -> &Context {
        &self.root().context
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        self.root().snapshot()
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.root().history
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.root().logs
    }

    pub fn views(&self) -> &[Value] {
        &self.root().views
    }

    pub fn is_final(&self) -> bool {
        self.view(ROOT).map(|v| v.is_final()).unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.root().running
    }

    /// Number of machines in the arena, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn view(&self, node: NodeId) -> Option<MachineView<'_>> {
        self.nodes.get(node).map(|n| MachineView { node_id: node, node: n })
    }

    pub fn node_snapshot(&self, node: NodeId) -> StateMachineResult<MachineSnapshot> {
        self.node(node).map(MachineNode::snapshot)
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// Direct child of the root registered under `name`
    pub fn child(&self, name: &str) -> Option<MachineView<'_>> {
        self.child_of(ROOT, name)
    }

    pub fn child_of(&self, parent: NodeId, name: &str) -> Option<MachineView<'_>> {
        let id = *self.nodes.get(parent)?.children.get(name)?;
        self.view(id)
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.root().children.keys().map(String::as_str).collect()
    }

    /// Register a child of the root machine
    pub fn with_child(&mut self, name: &str, config: &MachineConfig) -> StateMachineResult<NodeId> {
        self.with_child_at(ROOT, name, config)
    }

    /// Register a child (and its declared descendants) under `parent`.
    ///
    /// Rejects duplicate names under the same parent and any config whose id
    /// is already used by an ancestor. Either the whole subtree is attached
    /// or nothing is.
    pub fn with_child_at(
        &mut self,
        parent: NodeId,
        name: &str,
        config: &MachineConfig,
    ) -> StateMachineResult<NodeId> {
        let watermark = self.nodes.len();
        match self.attach(parent, name, config) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.nodes.truncate(watermark);
                if let Some(node) = self.nodes.get_mut(parent) {
                    node.children.retain(|_, id| *id < watermark);
                }
                Err(err)
            }
        }
    }

    fn attach(&mut self, parent: NodeId, name: &str, config: &MachineConfig) -> StateMachineResult<NodeId> {
        let parent_node = self.node(parent)?;
        if parent_node.children.contains_key(name) {
            return Err(StateMachineError::DuplicateChild {
                name: name.to_string(),
            });
        }
        if self.ancestor_ids(parent).any(|id| id == config.id.trim()) {
            return Err(StateMachineError::ChildCycle {
                child_id: config.id.clone(),
            });
        }

        let definition = MachineDefinition::compile(config)?;
        let context = definition.initial_context().clone();
        let id = self.nodes.len();
        self.nodes
            .push(MachineNode::new(definition, Some(name.to_string()), Some(parent), context));
        self.nodes[parent].children.insert(name.to_string(), id);

        for (grandchild, child_config) in &config.children {
            self.attach(id, grandchild, child_config)?;
        }

        debug!(
            parent_id = %self.nodes[parent].definition.id(),
            child_name = %name,
            child_id = %config.id,
            "Child machine registered"
        );
        Ok(id)
    }

    /// Ids of `node` and every machine above it
    fn ancestor_ids(&self, node: NodeId) -> impl Iterator<Item = &str> {
        let mut current = self.nodes.get(node);
        std::iter::from_fn(move || {
            let n = current?;
            current = n.parent.and_then(|p| self.nodes.get(p));
            Some(n.definition.id())
        })
    }

    /// Apply an event to the root machine
    pub fn apply(&mut self, event: &str, data: &Value) -> StateMachineResult<ApplyResult> {
        self.apply_to(ROOT, event, data)
    }

    /// Apply an event to a specific node. Children are not touched unless a
    /// `Delegate` action targets them.
    pub fn apply_to(&mut self, node: NodeId, event: &str, data: &Value) -> StateMachineResult<ApplyResult> {
        self.node(node)?;

        if let Some(builtin) = BuiltinEvent::from_wire(event, data) {
            self.apply_builtin(node, &builtin)?;
            return Ok(ApplyResult {
                snapshot: self.nodes[node].snapshot(),
                outcome: ApplyOutcome::Builtin,
                outbox: Vec::new(),
            });
        }

        let backup = self.nodes.clone();
        let mut outbox = Vec::new();
        match self.dispatch(node, event, data, &mut outbox) {
            Ok(outcome) => Ok(ApplyResult {
                snapshot: self.nodes[node].snapshot(),
                outcome,
                outbox,
            }),
            Err(err) => {
                self.nodes = backup;
                Err(err)
            }
        }
    }

    /// Handle a control event; never records history
    pub fn apply_builtin(&mut self, node: NodeId, event: &BuiltinEvent) -> StateMachineResult<MachineSnapshot> {
        let target = self.node_mut(node)?;
        match event {
            BuiltinEvent::SyncState(updates) => context::merge_shallow(&mut target.context, updates),
            BuiltinEvent::HealthPing => {}
        }
        Ok(target.snapshot())
    }

    fn dispatch(
        &mut self,
        node: NodeId,
        event: &str,
        data: &Value,
        outbox: &mut Vec<OutboundRequest>,
    ) -> StateMachineResult<ApplyOutcome> {
        let definition = Arc::clone(&self.nodes[node].definition);
        let from = self.nodes[node].state;

        let transition = definition
            .event_id(event)
            .and_then(|event_id| definition.transition(from, event_id));
        let Some(transition) = transition else {
            debug!(
                machine_id = %definition.id(),
                state = %definition.state_name(from),
                event = %event,
                "Event not declared for current state, ignoring"
            );
            return Ok(ApplyOutcome::Ignored);
        };

        for action in &transition.actions {
            self.run_action(node, event, action, data, outbox)?;
        }

        let to = transition.target;
        let record = TransitionRecord {
            event: event.to_string(),
            timestamp: Utc::now(),
            from_state: definition.state_name(from).to_string(),
            to_state: definition.state_name(to).to_string(),
        };
        self.nodes[node].state = to;
        self.nodes[node].history.push(record);

        if to != from {
            for action in definition.entry_actions(to) {
                self.run_action(node, event, action, data, outbox)?;
            }
        }

        Ok(ApplyOutcome::Transitioned {
            from: definition.state_name(from).to_string(),
            to: definition.state_name(to).to_string(),
        })
    }

    fn run_action(
        &mut self,
        node: NodeId,
        event: &str,
        action: &Action,
        data: &Value,
        outbox: &mut Vec<OutboundRequest>,
    ) -> StateMachineResult<()> {
        match action {
            Action::Assign { path, value } => {
                context::set_path(&mut self.nodes[node].context, path, value.clone())?;
            }
            Action::AssignFromEvent { path, from } => {
                let value = match from {
                    Some(field) => data.as_object().and_then(|obj| context::get_path(obj, field)).cloned(),
                    None => Some(data.clone()),
                };
                // Missing source fields leave the context untouched
                if let Some(value) = value {
                    context::set_path(&mut self.nodes[node].context, path, value)?;
                }
            }
            Action::MergeEventData => match data {
                Value::Object(updates) => context::merge_shallow(&mut self.nodes[node].context, updates),
                Value::Null => {}
                other => {
                    return Err(StateMachineError::ContextNotObject {
                        found: context::json_type_name(other).to_string(),
                    })
                }
            },
            Action::Increment { path, by } => {
                let ctx = &mut self.nodes[node].context;
                let current = match context::get_path(ctx, path) {
                    None | Some(Value::Null) => 0,
                    Some(Value::Number(n)) => n
                        .as_i64()
                        .ok_or_else(|| invalid_context_path(path, "value is not an integer"))?,
                    Some(other) => {
                        return Err(invalid_context_path(
                            path,
                            format!("cannot increment a {} value", context::json_type_name(other)),
                        ))
                    }
                };
                context::set_path(ctx, path, json!(current.saturating_add(*by)))?;
            }
            Action::Log { level, message } => {
                self.nodes[node].push_log(*level, message.clone(), json!({ "event": event }));
            }
            Action::EmitView { artifact } => self.nodes[node].views.push(artifact.clone()),
            Action::ClearViews => self.nodes[node].views.clear(),
            Action::Delegate { child, event: child_event } => {
                let child_id = *self.nodes[node].children.get(child).ok_or_else(|| {
                    StateMachineError::ChildNotFound {
                        name: child.clone(),
                    }
                })?;
                self.dispatch(child_id, child_event, data, outbox)?;
            }
            Action::SendMessage { action } => outbox.push(OutboundRequest {
                machine_id: self.nodes[node].definition.id().to_string(),
                action: action.clone(),
                payload: data.clone(),
            }),
        }
        Ok(())
    }

    /// Append an info-level entry to the root log stack
    pub fn log(&mut self, message: impl Into<String>, metadata: Value) {
        self.nodes[ROOT].push_log(LogLevel::Info, message, metadata);
    }

    pub fn log_at(&mut self, node: NodeId, level: LogLevel, message: impl Into<String>, metadata: Value) -> StateMachineResult<()> {
        self.node_mut(node)?.push_log(level, message, metadata);
        Ok(())
    }

    pub fn emit_view(&mut self, artifact: Value) {
        self.nodes[ROOT].views.push(artifact);
    }

    pub fn clear_views(&mut self) {
        self.nodes[ROOT].views.clear();
    }

    /// Shallow-merge `updates` into the root context
    pub fn update_context(&mut self, updates: &Context) {
        context::merge_shallow(&mut self.nodes[ROOT].context, updates);
    }

    pub fn set_context_path(&mut self, path: &str, value: Value) -> StateMachineResult<()> {
        context::set_path(&mut self.nodes[ROOT].context, path, value)
    }

    pub fn context_value(&self, path: &str) -> Option<&Value> {
        context::get_path(&self.root().context, path)
    }

    pub fn start(&mut self) {
        for node in &mut self.nodes {
            node.running = true;
        }
    }

    /// Mark every node stopped; calling it again is a no-op
    pub fn stop(&mut self) {
        for node in &mut self.nodes {
            node.running = false;
        }
    }

    fn root(&self) -> &MachineNode {
        &self.nodes[ROOT]
    }

    fn node(&self, node: NodeId) -> StateMachineResult<&MachineNode> {
        self.nodes.get(node).ok_or(StateMachineError::UnknownNode(node))
    }

    fn node_mut(&mut self, node: NodeId) -> StateMachineResult<&mut MachineNode> {
        self.nodes.get_mut(node).ok_or(StateMachineError::UnknownNode(node))
    }
}
