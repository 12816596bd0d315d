//! # Tome Registry
//!
//! Owns every registered tome, the global routing table built from their
//! route declarations, and the two dispatch entry points: route delivery for
//! the embedding HTTP layer and direct machine messaging for collaborators
//! such as the connection topology.
//!
//! ## Usage
//!
//! ```rust
//! use tome_core::registry::{HttpMethod, RouteConfig, RouteRequest, TomeConfig, TomeRegistry};
//! use tome_core::state_machine::{MachineConfig, StateConfig};
//!
//! let registry = TomeRegistry::default();
//! registry.register(
//!     TomeConfig::new("editor", "Editor")
//!         .machine(
//!             "main",
//!             MachineConfig::new("editor-main", "idle")
//!                 .state("idle", StateConfig::new().on("OPEN", "editing"))
//!                 .state("editing", StateConfig::new()),
//!         )
//!         .route(RouteConfig::new(HttpMethod::Post, "/open", "main").with_event("OPEN")),
//! )?;
//!
//! # tokio_test::block_on(async {
//! let result = registry
//!     .deliver_route(&RouteRequest::new(HttpMethod::Post, "/api/editor/open"))
//!     .await?;
//! assert_eq!(result.snapshot.state, "editing");
//! # Ok::<(), tome_core::TomeError>(())
//! # })?;
//! # Ok::<(), tome_core::TomeError>(())
//! ```

use super::routes::{normalize_path, HttpMethod, RouteBinding, RouteInfo, RouteRequest, RouteResponse, RouteResult};
use super::tome::{ProbeReport, TomeConfig, TomeInstance, TomeStatus};
use crate::config::RegistryConfig;
use crate::constants::headers;
use crate::error::{Result, TomeError};
use crate::logging::{log_error, log_tome_operation};
use crate::messaging::{ids, BrokerResponse, MessageBroker};
use crate::state_machine::{
    ApplyOutcome, ApplyResult, Context, MachineSnapshot, OutboundRequest, PersistedTransition, TransitionPersistence,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of the async dispatch path
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub snapshot: MachineSnapshot,
    pub outcome: ApplyOutcome,
    pub trace_id: String,
    /// Backend responses for every `SendMessage` action, in execution order
    pub sent: Vec<BrokerResponse>,
    /// Requests left unsent because no broker is attached
    pub unsent: Vec<OutboundRequest>,
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_tomes: usize,
    pub running_tomes: usize,
    pub total_machines: usize,
    pub total_routes: usize,
}

pub struct TomeRegistry {
    config: RegistryConfig,
    tomes: DashMap<String, Arc<TomeInstance>>,
    /// Registration order, for stable status listings
    order: Mutex<Vec<String>>,
    routes: DashMap<(HttpMethod, String), RouteBinding>,
    /// Serializes register / unregister so collision checks see a stable table
    registration: Mutex<()>,
    broker: Option<Arc<MessageBroker>>,
    persistence: Option<Arc<dyn TransitionPersistence>>,
}

impl Default for TomeRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for TomeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TomeRegistry")
            .field("config", &self.config)
            .field("tomes", &self.order.lock())
            .field("routes", &self.routes.len())
            .field("broker", &self.broker.is_some())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

impl TomeRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            tomes: DashMap::new(),
            order: Mutex::new(Vec::new()),
            routes: DashMap::new(),
            registration: Mutex::new(()),
            broker: None,
            persistence: None,
        }
    }

    /// Attach the broker used for machine-requested sends
    pub fn with_broker(mut self, broker: Arc<MessageBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Attach a persistence collaborator that receives every transition made
    /// through [`dispatch_tome_message`](Self::dispatch_tome_message)
    pub fn with_persistence(mut self, persistence: Arc<dyn TransitionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn broker(&self) -> Option<&Arc<MessageBroker>> {
        self.broker.as_ref()
    }

    /// Register a tome. Nothing is stored unless every machine compiles and
    /// every route binds without colliding with an existing one.
    pub fn register(&self, config: TomeConfig) -> Result<Arc<TomeInstance>> {
        let _guard = self.registration.lock();

        if self.tomes.contains_key(&config.id) {
            return Err(TomeError::validation(format!(
                "Tome {} is already registered",
                config.id
            )));
        }

        let tome = Arc::new(TomeInstance::build(config).inspect_err(|err| {
            log_error("tome_registry", "register", &err.to_string(), None);
        })?);

        for binding in tome.routes() {
            if let Some(existing) = self.routes.get(&(binding.method, binding.path.clone())) {
                return Err(TomeError::validation(format!(
                    "Route {} {} is already bound by tome {}",
                    binding.method,
                    binding.path,
                    existing.tome_id
                )));
            }
        }

        for binding in tome.routes() {
            self.routes
                .insert((binding.method, binding.path.clone()), binding.clone());
        }
        self.tomes.insert(tome.id().to_string(), Arc::clone(&tome));
        self.order.lock().push(tome.id().to_string());

        if self.config.auto_start {
            tome.start();
        }

        log_tome_operation(
            "register",
            tome.id(),
            None,
            "registered",
            Some(&format!(
                "{} machines, {} routes",
                tome.machine_keys().count(),
                tome.routes().len()
            )),
        );
        Ok(tome)
    }

    /// Stop and remove a tome along with its routes. Returns false when the id
    /// is unknown.
    pub fn unregister(&self, tome_id: &str) -> bool {
        let _guard = self.registration.lock();

        let Some((_, tome)) = self.tomes.remove(tome_id) else {
            return false;
        };
        tome.stop();
        self.routes.retain(|_, binding| binding.tome_id != tome_id);
        self.order.lock().retain(|id| id != tome_id);

        log_tome_operation("unregister", tome_id, None, "unregistered", None);
        true
    }

    pub fn start_tome(&self, tome_id: &str) -> Result<()> {
        self.get_tome(tome_id)?.start();
        log_tome_operation("start", tome_id, None, "running", None);
        Ok(())
    }

    pub fn stop_tome(&self, tome_id: &str) -> Result<()> {
        self.get_tome(tome_id)?.stop();
        log_tome_operation("stop", tome_id, None, "stopped", None);
        Ok(())
    }

    pub fn get_tome(&self, tome_id: &str) -> Result<Arc<TomeInstance>> {
        self.tomes
            .get(tome_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TomeError::not_found("Tome", tome_id))
    }

    pub fn contains(&self, tome_id: &str) -> bool {
        self.tomes.contains_key(tome_id)
    }

    /// Registered tome ids in registration order
    pub fn list_tomes(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    pub fn tome_count(&self) -> usize {
        self.tomes.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_tomes: 0,
            running_tomes: 0,
            total_machines: 0,
            total_routes: self.routes.len(),
        };
        for entry in self.tomes.iter() {
            stats.total_tomes += 1;
            stats.total_machines += entry.machine_keys().count();
            if entry.is_running() {
                stats.running_tomes += 1;
            }
        }
        stats
    }

    /// Apply `event` to one machine and return its new snapshot
    pub fn send_tome_message(
        &self,
        tome_id: &str,
        machine_key: &str,
        event: &str,
        data: &Value,
    ) -> Result<MachineSnapshot> {
        self.apply_tome_message(tome_id, machine_key, event, data)
            .map(|result| result.snapshot)
    }

    /// Like [`send_tome_message`](Self::send_tome_message) but keeps the apply
    /// outcome and any outbox requests.
    ///
    /// Nothing is sent from here: the caller owns the returned outbox and is
    /// expected to hand it to a broker, as
    /// [`dispatch_tome_message`](Self::dispatch_tome_message) does.
    pub fn apply_tome_message(
        &self,
        tome_id: &str,
        machine_key: &str,
        event: &str,
        data: &Value,
    ) -> Result<ApplyResult> {
        let tome = self.get_tome(tome_id)?;
        let result = tome.send_message(machine_key, event, data)?;

        if !result.outbox.is_empty() {
            debug!(
                tome_id = %tome_id,
                machine_key = %machine_key,
                pending = result.outbox.len(),
                "Outbox requests returned to caller"
            );
        }
        Ok(result)
    }

    /// Apply `event`, hand the transition to the persistence collaborator and
    /// perform every requested broker send in one trace.
    ///
    /// A failed write or send is returned as an error; the in-memory
    /// transition itself is kept. Sends are skipped when the write fails.
    pub async fn dispatch_tome_message(
        &self,
        tome_id: &str,
        machine_key: &str,
        event: &str,
        data: &Value,
        trace_id: Option<&str>,
    ) -> Result<DispatchOutcome> {
        let tome = self.get_tome(tome_id)?;
        let trace_id = self.resolve_trace_id(trace_id);
        self.dispatch_on(&tome, machine_key, event, data, trace_id).await
    }

    async fn dispatch_on(
        &self,
        tome: &TomeInstance,
        machine_key: &str,
        event: &str,
        data: &Value,
        trace_id: String,
    ) -> Result<DispatchOutcome> {
        let (result, record) = tome.send_message_recorded(machine_key, event, data)?;

        if let (Some(persistence), Some(record)) = (&self.persistence, &record) {
            let transition = PersistedTransition::from_record(tome.id(), machine_key, record)
                .with_metadata(json!({ "traceId": trace_id }));
            persistence.persist_transition(transition).await.inspect_err(|err| {
                warn!(
                    tome_id = %tome.id(),
                    machine_key = %machine_key,
                    trace_id = %trace_id,
                    error = %err,
                    "Transition persistence failed"
                );
            })?;
        }

        let ApplyResult {
            snapshot,
            outcome,
            outbox,
        } = result;
        let (sent, unsent) = self.perform_sends(tome.id(), machine_key, outbox, &trace_id).await?;

        Ok(DispatchOutcome {
            snapshot,
            outcome,
            trace_id,
            sent,
            unsent,
        })
    }

    /// Send outbox requests in `trace_id`, stopping at the first failure.
    /// Without a broker the requests come back unsent.
    async fn perform_sends(
        &self,
        tome_id: &str,
        machine_key: &str,
        outbox: Vec<OutboundRequest>,
        trace_id: &str,
    ) -> Result<(Vec<BrokerResponse>, Vec<OutboundRequest>)> {
        if outbox.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let Some(broker) = &self.broker else {
            warn!(
                tome_id = %tome_id,
                machine_key = %machine_key,
                unsent = outbox.len(),
                "No broker attached; returning machine send requests unsent"
            );
            return Ok((Vec::new(), outbox));
        };

        let mut sent = Vec::with_capacity(outbox.len());
        for request in outbox {
            let response = broker
                .send_traced(&request.action, request.payload, Some(trace_id))
                .await?;
            sent.push(response);
        }
        Ok((sent, Vec::new()))
    }

    fn resolve_trace_id(&self, trace_id: Option<&str>) -> String {
        match (trace_id, &self.broker) {
            (Some(trace_id), _) => trace_id.to_string(),
            (None, Some(broker)) => broker.generate_trace_id(),
            (None, None) => ids::generate_trace_id(),
        }
    }

    /// Match method + path against every running tome's routing table and
    /// dispatch the bound event.
    ///
    /// The body event wins over the route's default event. The input
    /// transformer sees the body data; the output transformer sees the new
    /// snapshot. Machine sends run in the trace named by `x-trace-id`, or a
    /// fresh one.
    pub async fn deliver_route(&self, request: &RouteRequest) -> Result<RouteResult> {
        let trace_id = self.resolve_trace_id(request.header(headers::TRACE_ID));
        self.deliver_in_trace(request, trace_id).await
    }

    async fn deliver_in_trace(&self, request: &RouteRequest, trace_id: String) -> Result<RouteResult> {
        let path = normalize_path(&request.path);
        let binding = self
            .routes
            .get(&(request.method, path.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TomeError::route_not_found(request.method.to_string(), &path))?;

        let tome = self.get_tome(&binding.tome_id)?;
        if !tome.is_running() {
            return Err(TomeError::route_not_found(request.method.to_string(), &path));
        }

        let event = request
            .body
            .event
            .clone()
            .filter(|event| !event.is_empty())
            .or_else(|| binding.default_event.clone())
            .ok_or_else(|| TomeError::validation("Event is required"))?;

        let data = binding.transformers.apply_input(request.body.data.clone());
        let dispatched = self
            .dispatch_on(&tome, &binding.machine_key, &event, &data, trace_id)
            .await?;
        let result = binding
            .transformers
            .apply_output(serde_json::to_value(&dispatched.snapshot)?);

        Ok(RouteResult {
            tome_id: binding.tome_id,
            machine_key: binding.machine_key,
            event,
            snapshot: dispatched.snapshot,
            outcome: dispatched.outcome,
            result,
            trace_id: dispatched.trace_id,
            sent: dispatched.sent,
            unsent: dispatched.unsent,
        })
    }

    /// Outermost route layer: never fails, always answers with the uniform
    /// response shape. Transport and persistence failures become
    /// `success: false` in the request's trace.
    pub async fn handle_route(&self, request: &RouteRequest) -> RouteResponse {
        let started = Instant::now();
        let trace_id = self.resolve_trace_id(request.header(headers::TRACE_ID));
        let span_id = request
            .header(headers::SPAN_ID)
            .map(str::to_string)
            .unwrap_or_else(ids::generate_span_id);

        let binding = self
            .routes
            .get(&(request.method, normalize_path(&request.path)))
            .map(|entry| entry.value().info());

        let (success, result, error, error_kind, event) =
            match self.deliver_in_trace(request, trace_id.clone()).await {
                Ok(delivered) => (true, Some(delivered.result), None, None, Some(delivered.event)),
                Err(err) => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        trace_id = %trace_id,
                        error = %err,
                        "Route delivery failed"
                    );
                    let event = request
                        .body
                        .event
                        .clone()
                        .or_else(|| binding.as_ref().and_then(|b| b.event.clone()));
                    (false, None, Some(err.to_string()), Some(err.category().to_string()), event)
                }
            };

        RouteResponse {
            success,
            tome: binding.as_ref().map(|b| b.tome_id.clone()),
            machine: binding.as_ref().map(|b| b.machine_key.clone()),
            event,
            result,
            error,
            error_kind,
            timestamp: Utc::now(),
            trace_id,
            span_id,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Status snapshots of every tome in registration order
    pub fn get_tome_status(&self) -> Vec<TomeStatus> {
        self.list_tomes()
            .iter()
            .filter_map(|id| self.tomes.get(id).map(|tome| tome.status()))
            .collect()
    }

    pub fn get_machine_state(&self, tome_id: &str, machine_key: &str) -> Result<MachineSnapshot> {
        self.get_tome(tome_id)?.get_state(machine_key)
    }

    /// Merge into the tome's shared context and every one of its machines
    pub fn update_tome_context(&self, tome_id: &str, updates: &Context) -> Result<()> {
        self.get_tome(tome_id)?.update_context(updates);
        log_tome_operation("update_context", tome_id, None, "merged", None);
        Ok(())
    }

    pub fn set_machine_context_path(
        &self,
        tome_id: &str,
        machine_key: &str,
        path: &str,
        value: Value,
    ) -> Result<()> {
        let tome = self.get_tome(tome_id)?;
        tome.with_machine(machine_key, |machine| machine.set_context_path(path, value))??;
        Ok(())
    }

    pub fn machine_context_value(&self, tome_id: &str, machine_key: &str, path: &str) -> Result<Option<Value>> {
        let tome = self.get_tome(tome_id)?;
        tome.with_machine(machine_key, |machine| machine.context_value(path).cloned())
    }

    /// Reachability probe; an unknown tome is unhealthy
    pub fn probe(&self, tome_id: &str, timeout: Duration) -> ProbeReport {
        match self.tomes.get(tome_id).map(|entry| Arc::clone(entry.value())) {
            Some(tome) => tome.probe(timeout),
            None => ProbeReport::unhealthy(format!("tome {tome_id} is not registered")),
        }
    }

    /// Bound routes sorted by path then method
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self.routes.iter().map(|entry| entry.value().info()).collect();
        routes.sort_by(|a, b| a.path.cmp(&b.path).then(a.method.cmp(&b.method)));
        routes
    }

    /// Whether any method is bound at `path`
    pub fn has_route_path(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.routes.iter().any(|entry| entry.key().1 == path)
    }

    /// Distinct bound paths
    pub fn route_paths(&self) -> HashSet<String> {
        self.routes.iter().map(|entry| entry.key().1.clone()).collect()
    }
}
