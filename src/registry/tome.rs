//! # Tome Instances
//!
//! A tome bundles named machines, a shared context and a routing table. Each
//! machine sits behind its own mutex so unrelated machines, and unrelated
//! tomes, progress independently.

use super::routes::{join_paths, RouteBinding, RouteConfig};
use crate::constants::HealthStatus;
use crate::error::{Result, TomeError};
use crate::state_machine::{
    context, ApplyOutcome, ApplyResult, BuiltinEvent, Context, MachineConfig, MachineSnapshot,
    StateMachine, TransitionRecord, ROOT,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TomeConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub machines: BTreeMap<String, MachineConfig>,
    /// Merged into every machine's context; machine context wins on conflict
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
}

impl TomeConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            machines: BTreeMap::new(),
            context: Context::new(),
            routing: None,
        }
    }

    pub fn machine(mut self, key: impl Into<String>, config: MachineConfig) -> Self {
        self.machines.insert(key.into(), config);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn route(mut self, route: RouteConfig) -> Self {
        self.routing.get_or_insert_with(RoutingConfig::default).routes.push(route);
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.routing.get_or_insert_with(RoutingConfig::default).base_path = Some(base_path.into());
        self
    }

    /// Mount point of the routing table, `/api/{id}` unless configured
    pub fn base_path(&self) -> String {
        self.routing
            .as_ref()
            .and_then(|r| r.base_path.clone())
            .unwrap_or_else(|| format!("/api/{}", self.id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Observability snapshot of one tome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TomeStatus {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub running: bool,
    pub machines: BTreeMap<String, MachineSnapshot>,
    pub context: Value,
}

/// Outcome of one reachability probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: None,
        }
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            detail: Some(detail.into()),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug)]
pub struct TomeInstance {
    config: TomeConfig,
    machines: BTreeMap<String, Mutex<StateMachine>>,
    shared_context: Mutex<Context>,
    routes: Vec<RouteBinding>,
    running: AtomicBool,
    registered_at: DateTime<Utc>,
}

impl TomeInstance {
    /// Compile every machine and bind every route; nothing is kept on failure
    pub fn build(config: TomeConfig) -> Result<Self> {
        if config.id.trim().is_empty() {
            return Err(TomeError::validation("Tome id is required"));
        }
        if config.machines.is_empty() {
            return Err(TomeError::validation(format!(
                "Tome {} must declare at least one machine",
                config.id
            )));
        }

        let mut machines = BTreeMap::new();
        for (key, machine_config) in &config.machines {
            let machine = StateMachine::with_shared_context(machine_config, &config.context)?;
            debug!(tome_id = %config.id, machine_key = %key, machine_id = %machine.id(), "Created machine");
            machines.insert(key.clone(), Mutex::new(machine));
        }

        let base_path = config.base_path();
        let mut routes: Vec<RouteBinding> = Vec::new();
        if let Some(routing) = &config.routing {
            for route in &routing.routes {
                let machine = machines.get(&route.machine).ok_or_else(|| {
                    TomeError::validation(format!(
                        "Route {} {} references unknown machine '{}' in tome {}",
                        route.method, route.path, route.machine, config.id
                    ))
                })?;

                if let Some(event) = &route.event {
                    let declared = machine.lock().definition().declares_event(event);
                    if !declared && !BuiltinEvent::is_reserved(event) {
                        return Err(TomeError::validation(format!(
                            "Route {} {} binds event '{}' which machine '{}' does not declare",
                            route.method, route.path, event, route.machine
                        )));
                    }
                }

                let path = join_paths(&base_path, &route.path);
                if routes.iter().any(|r| r.method == route.method && r.path == path) {
                    return Err(TomeError::validation(format!(
                        "Route {} {path} declared twice in tome {}",
                        route.method, config.id
                    )));
                }

                routes.push(RouteBinding {
                    tome_id: config.id.clone(),
                    machine_key: route.machine.clone(),
                    method: route.method,
                    path,
                    default_event: route.event.clone(),
                    transformers: route.transformers.clone(),
                });
            }
        }

        Ok(Self {
            shared_context: Mutex::new(config.context.clone()),
            config,
            machines,
            routes,
            running: AtomicBool::new(false),
            registered_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TomeConfig {
        &self.config
    }

    pub fn routes(&self) -> &[RouteBinding] {
        &self.routes
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn machine_keys(&self) -> impl Iterator<Item = &str> {
        self.machines.keys().map(String::as_str)
    }

    pub fn has_machine(&self, key: &str) -> bool {
        self.machines.contains_key(key)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        for machine in self.machines.values() {
            machine.lock().start();
        }
    }

    /// Stop every machine; calling it on a stopped tome does nothing
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for machine in self.machines.values() {
            machine.lock().stop();
        }
    }

    /// Apply `event` to one machine under that machine's lock
    pub fn send_message(&self, machine_key: &str, event: &str, data: &Value) -> Result<ApplyResult> {
        self.send_message_recorded(machine_key, event, data).map(|(result, _)| result)
    }

    /// Like [`send_message`](Self::send_message), also returning the history
    /// entry the event produced, read under the same lock
    pub fn send_message_recorded(
        &self,
        machine_key: &str,
        event: &str,
        data: &Value,
    ) -> Result<(ApplyResult, Option<TransitionRecord>)> {
        if !self.is_running() {
            return Err(TomeError::validation(format!(
                "Tome {} is stopped",
                self.id()
            )));
        }
        let machine = self.machine(machine_key)?;
        let mut guard = machine.lock();
        let result = guard.apply(event, data)?;
        let record = match result.outcome {
            ApplyOutcome::Transitioned { .. } => guard.history().last().cloned(),
            _ => None,
        };
        Ok((result, record))
    }

    pub fn get_state(&self, machine_key: &str) -> Result<MachineSnapshot> {
        Ok(self.machine(machine_key)?.lock().snapshot())
    }

    /// Run `f` against a machine while holding its lock
    pub fn with_machine<R>(&self, machine_key: &str, f: impl FnOnce(&mut StateMachine) -> R) -> Result<R> {
        let machine = self.machine(machine_key)?;
        let mut guard = machine.lock();
        Ok(f(&mut guard))
    }

    /// Shallow-merge into the shared context and into every machine
    pub fn update_context(&self, updates: &Context) {
        context::merge_shallow(&mut self.shared_context.lock(), updates);
        for machine in self.machines.values() {
            machine.lock().update_context(updates);
        }
    }

    pub fn shared_context(&self) -> Context {
        self.shared_context.lock().clone()
    }

    /// Non-mutating snapshot of every machine
    pub fn status(&self) -> TomeStatus {
        TomeStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            version: self.config.version.clone(),
            running: self.is_running(),
            machines: self
                .machines
                .iter()
                .map(|(key, machine)| (key.clone(), machine.lock().snapshot()))
                .collect(),
            context: Value::Object(self.shared_context()),
        }
    }

    /// Reachability probe: every machine must answer a health ping within
    /// `timeout`. A stopped tome or a busy machine is degraded.
    pub fn probe(&self, timeout: Duration) -> ProbeReport {
        if !self.is_running() {
            return ProbeReport::degraded(format!("tome {} is stopped", self.id()));
        }

        let mut busy = Vec::new();
        for (key, machine) in &self.machines {
            match machine.try_lock_for(timeout) {
                Some(mut guard) => {
                    if let Err(err) = guard.apply_builtin(ROOT, &BuiltinEvent::HealthPing) {
                        busy.push(format!("{key}: {err}"));
                    }
                }
                None => busy.push(key.clone()),
            }
        }

        if busy.is_empty() {
            ProbeReport::healthy()
        } else {
            ProbeReport::degraded(format!("unresponsive machines: {}", busy.join(", ")))
        }
    }

    fn machine(&self, machine_key: &str) -> Result<&Mutex<StateMachine>> {
        self.machines
            .get(machine_key)
            .ok_or_else(|| TomeError::not_found("Machine", format!("{}/{machine_key}", self.id())))
    }
}
