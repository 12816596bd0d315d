//! # Connection Topology
//!
//! Directed connections between registered tomes, the ring and hub builders,
//! event broadcast across connections and the health monitor lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ConnectionTopology
//! ├── TomeRegistry     (endpoint resolution, delivery via send_tome_message)
//! ├── MessageBroker    (every connection event recorded with track_message)
//! └── HealthMonitor    (runs while at least one connection exists)
//! ```
//!
//! Bulk builders are all-or-nothing: every endpoint is validated before the
//! first connection is created, and a failure part-way through removes the
//! connections that call already created.

use super::connection::{Connection, ConnectionConfig, FieldPath, FlowDirection};
use super::health::HealthMonitor;
use super::validation::{
    amplification_warnings, cycle_nodes, fan_out_warnings, high_frequency_warnings, structural_issues,
    NetworkValidation, StructuralConfig, TomeDirectory,
};
use super::view::{HealthSummary, NetworkHealthReport, NetworkTopology};
use crate::config::TopologyConfig;
use crate::constants::{actions, system, toggles, HealthStatus, NetworkHealth};
use crate::error::{Result, TomeError};
use crate::logging::log_connection_operation;
use crate::messaging::{ids, Direction, MessageBroker, MessageMetadata};
use crate::registry::{ProbeReport, TomeRegistry};
use crate::state_machine::{ApplyOutcome, OutboundRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// One successful delivery of a broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub connection_id: String,
    pub target_tome_id: String,
    pub machine_key: String,
    pub event: String,
    pub direction: FlowDirection,
    pub outcome: ApplyOutcome,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The connection's event filter excludes the event
    Filtered,
    /// The connection maps no event for it
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedConnection {
    pub connection_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub connection_id: String,
    pub target_tome_id: String,
    pub machine_key: Option<String>,
    pub error: String,
}

/// A `SendMessage` request raised by a receiving machine during a broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSend {
    pub connection_id: String,
    pub target_tome_id: String,
    pub machine_key: String,
    pub request: OutboundRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub connection_id: String,
    pub target_tome_id: String,
    pub machine_key: String,
    pub action: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    pub event: String,
    pub source_tome_id: String,
    /// Shared by every message the broadcast recorded
    pub trace_id: String,
    pub deliveries: Vec<Delivery>,
    pub skipped: Vec<SkippedConnection>,
    pub failures: Vec<DeliveryFailure>,
    /// Machine sends not yet performed; emptied by
    /// [`ConnectionTopology::dispatch_broadcast`]
    pub pending: Vec<PendingSend>,
    pub sent: Vec<SentMessage>,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.deliveries.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub connection_id: String,
    pub trace_id: String,
    /// Target paths that received a value
    pub applied: Vec<String>,
    /// Source paths with no value to copy
    pub missing: Vec<String>,
}

pub struct ConnectionTopology {
    config: TopologyConfig,
    registry: Arc<TomeRegistry>,
    broker: Arc<MessageBroker>,
    connections: DashMap<String, Connection>,
    /// Creation order, for stable listings
    order: Mutex<Vec<String>>,
    monitor: Mutex<Option<HealthMonitor>>,
    last_health_check: Mutex<Option<DateTime<Utc>>>,
    weak_self: Weak<ConnectionTopology>,
}

impl fmt::Debug for ConnectionTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTopology")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("monitor_running", &self.monitor_running())
            .finish()
    }
}

impl ConnectionTopology {
    pub fn new(registry: Arc<TomeRegistry>, broker: Arc<MessageBroker>, config: TopologyConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            registry,
            broker,
            connections: DashMap::new(),
            order: Mutex::new(Vec::new()),
            monitor: Mutex::new(None),
            last_health_check: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TomeRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    /// Connect `source_tome_id` to `target_tome_id`. The connection starts with
    /// health `unknown`; the first connection starts the health monitor.
    pub fn connect(&self, source_tome_id: &str, target_tome_id: &str, config: ConnectionConfig) -> Result<String> {
        self.validate_endpoints(source_tome_id, target_tome_id, &config)?;
        let id = self.insert_connection(source_tome_id, target_tome_id, config);
        self.ensure_monitor();
        Ok(id)
    }

    /// Remove a connection. Returns false when the id is unknown.
    pub fn disconnect(&self, connection_id: &str) -> bool {
        let Some(connection) = self.remove_connection(connection_id) else {
            return false;
        };

        let trace_id = self.broker.generate_trace_id();
        let span_id = self.broker.generate_span_id();
        let duration_ms = (Utc::now() - connection.created_at).num_milliseconds();
        self.broker.track_message(
            &format!("disconnect_{connection_id}"),
            &trace_id,
            &span_id,
            MessageMetadata::new(actions::CONNECTION_DISCONNECTED).with_data(json!({
                "connectionId": connection_id,
                "source": connection.source_tome_id,
                "target": connection.target_tome_id,
                "durationMs": duration_ms,
            })),
        );

        log_connection_operation(
            "disconnect",
            Some(connection_id),
            Some(&connection.source_tome_id),
            Some(&connection.target_tome_id),
            "disconnected",
            None,
        );

        self.stop_monitor_if_idle();
        true
    }

    /// Ring topology: each tome links to the next and the last back to the
    /// first, N connections for N tomes
    pub fn create_network<S: AsRef<str>>(&self, tome_ids: &[S], config: &ConnectionConfig) -> Result<Vec<String>> {
        if tome_ids.len() < 2 {
            return Err(TomeError::validation("At least 2 tomes are required for ring network"));
        }

        let n = tome_ids.len();
        let pairs: Vec<(&str, &str)> = (0..n)
            .map(|i| (tome_ids[i].as_ref(), tome_ids[(i + 1) % n].as_ref()))
            .collect();
        let ids = self.build_all(&pairs, config)?;

        log_connection_operation(
            "create_network",
            None,
            None,
            None,
            "created",
            Some(&format!("ring of {n} tomes")),
        );
        Ok(ids)
    }

    /// Hub-and-spoke topology: one connection per spoke, each sourced at the hub
    pub fn create_hub_network<S: AsRef<str>>(
        &self,
        hub_tome_id: &str,
        spoke_tome_ids: &[S],
        config: &ConnectionConfig,
    ) -> Result<Vec<String>> {
        if hub_tome_id.trim().is_empty() || spoke_tome_ids.is_empty() {
            return Err(TomeError::validation("hubTome and spokeTomes array are required"));
        }

        let pairs: Vec<(&str, &str)> = spoke_tome_ids
            .iter()
            .map(|spoke| (hub_tome_id, spoke.as_ref()))
            .collect();
        let ids = self.build_all(&pairs, config)?;

        log_connection_operation(
            "create_hub_network",
            None,
            Some(hub_tome_id),
            None,
            "created",
            Some(&format!("{} spokes", spoke_tome_ids.len())),
        );
        Ok(ids)
    }

    pub fn broadcast_event(&self, event: &str, source_tome_id: &str) -> Result<BroadcastReport> {
        self.broadcast_event_with_data(event, source_tome_id, &Value::Null)
    }

    /// Deliver `event` across every connection leaving `source_tome_id`, and
    /// back across bidirectional connections arriving at it.
    ///
    /// Per-target failures are collected in the report; they do not stop the
    /// broadcast. Sends requested by receiving machines are not performed
    /// here: they come back in [`BroadcastReport::pending`].
    pub fn broadcast_event_with_data(&self, event: &str, source_tome_id: &str, data: &Value) -> Result<BroadcastReport> {
        if event.trim().is_empty() || source_tome_id.trim().is_empty() {
            return Err(TomeError::validation("event and sourceTome are required"));
        }
        if !self.registry.contains(source_tome_id) {
            return Err(TomeError::not_found("Tome", source_tome_id));
        }

        let candidates: Vec<(Connection, FlowDirection)> = self
            .get_connections()
            .into_iter()
            .filter_map(|c| c.direction_from(source_tome_id).map(|d| (c, d)))
            .collect();

        let trace_id = self.broker.generate_trace_id();
        let span_id = self.broker.generate_span_id();
        self.broker.track_message(
            &self.broker.generate_message_id(),
            &trace_id,
            &span_id,
            MessageMetadata::new(actions::EVENT_BROADCASTED).with_data(json!({
                "eventType": event,
                "source": source_tome_id,
                "targetCount": candidates.len(),
            })),
        );

        let mut report = BroadcastReport {
            event: event.to_string(),
            source_tome_id: source_tome_id.to_string(),
            trace_id: trace_id.clone(),
            deliveries: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            pending: Vec::new(),
            sent: Vec::new(),
        };

        for (connection, direction) in candidates {
            if !connection.filters.allows(event) {
                report.skipped.push(SkippedConnection {
                    connection_id: connection.id.clone(),
                    reason: SkipReason::Filtered,
                });
                continue;
            }
            let Some(mapped) = connection.map_event(event, direction) else {
                report.skipped.push(SkippedConnection {
                    connection_id: connection.id.clone(),
                    reason: SkipReason::Unmapped,
                });
                continue;
            };

            self.forward(&connection, direction, source_tome_id, event, mapped, data, &trace_id, &mut report);
            self.touch(&connection.id);
        }

        log_connection_operation(
            "broadcast",
            None,
            Some(source_tome_id),
            None,
            if report.failures.is_empty() { "delivered" } else { "partial" },
            Some(&format!(
                "event={event} delivered={} skipped={} failed={}",
                report.deliveries.len(),
                report.skipped.len(),
                report.failures.len()
            )),
        );
        Ok(report)
    }

    /// Broadcast, then perform every machine-requested send in the
    /// broadcast's trace. A failed send becomes a delivery failure; the
    /// remaining sends still run.
    pub async fn dispatch_broadcast(&self, event: &str, source_tome_id: &str, data: &Value) -> Result<BroadcastReport> {
        let mut report = self.broadcast_event_with_data(event, source_tome_id, data)?;

        for pending in std::mem::take(&mut report.pending) {
            let PendingSend {
                connection_id,
                target_tome_id,
                machine_key,
                request,
            } = pending;
            let outcome = self
                .broker
                .send_traced(&request.action, request.payload, Some(&report.trace_id))
                .await;
            match outcome {
                Ok(response) => report.sent.push(SentMessage {
                    connection_id,
                    target_tome_id,
                    machine_key,
                    action: request.action,
                    message_id: response.message_id,
                }),
                Err(err) => {
                    warn!(
                        connection_id = %connection_id,
                        target_tome_id = %target_tome_id,
                        action = %request.action,
                        error = %err,
                        "Broadcast machine send failed"
                    );
                    report.failures.push(DeliveryFailure {
                        connection_id,
                        target_tome_id,
                        machine_key: Some(machine_key),
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Copy every mapped field from source to target without sending an event
    pub fn sync_state(&self, connection_id: &str) -> Result<SyncReport> {
        let connection = self
            .get_connection(connection_id)
            .ok_or_else(|| TomeError::not_found("Connection", connection_id))?;

        let mut applied = Vec::new();
        let mut missing = Vec::new();
        for (read, write) in connection.field_pairs(FlowDirection::Forward) {
            if self.transfer_field(&connection.source_tome_id, read, &connection.target_tome_id, write)? {
                applied.push(write.to_string());
            } else {
                missing.push(read.to_string());
            }
        }

        let trace_id = connection.trace_id.clone();
        self.broker.track_message(
            &self.broker.generate_message_id(),
            &trace_id,
            &self.broker.generate_span_id(),
            MessageMetadata::new(actions::STATE_SYNCHRONIZED).with_data(json!({
                "connectionId": connection_id,
                "source": connection.source_tome_id,
                "target": connection.target_tome_id,
                "updates": applied,
            })),
        );
        self.touch(connection_id);

        Ok(SyncReport {
            connection_id: connection_id.to_string(),
            trace_id,
            applied,
            missing,
        })
    }

    /// Every connection in creation order
    pub fn get_connections(&self) -> Vec<Connection> {
        let order = self.order.lock().clone();
        order
            .iter()
            .filter_map(|id| self.connections.get(id).map(|c| c.clone()))
            .collect()
    }

    pub fn get_connection(&self, connection_id: &str) -> Option<Connection> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Connections with `tome_id` at either end
    pub fn connections_for_tome(&self, tome_id: &str) -> Vec<Connection> {
        self.get_connections()
            .into_iter()
            .filter(|c| c.touches(tome_id))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn get_network_topology(&self) -> NetworkTopology {
        NetworkTopology::from_connections(&self.get_connections())
    }

    pub fn network_health(&self) -> NetworkHealthReport {
        let statuses: Vec<HealthStatus> = self.get_connections().iter().map(|c| c.health_status).collect();
        NetworkHealthReport {
            status: NetworkHealth::aggregate(statuses.iter().copied()),
            connections: statuses.into_iter().collect(),
            last_check: *self.last_health_check.lock(),
            timestamp: Utc::now(),
        }
    }

    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.lock()
    }

    /// One monitor cycle: probe both endpoints of every connection and store
    /// the resulting status. Failures degrade status; nothing is raised.
    pub fn run_health_check(&self) -> HealthSummary {
        let timeout = self.config.probe_timeout();
        let mut summary = HealthSummary::default();

        for connection in self.get_connections() {
            let source = self.registry.probe(&connection.source_tome_id, timeout);
            let target = self.registry.probe(&connection.target_tome_id, timeout);
            let mut report = worse(source, target);

            if report.status == HealthStatus::Healthy {
                if let Some(machine) = &connection.target_machine {
                    let present = self
                        .registry
                        .get_tome(&connection.target_tome_id)
                        .map(|tome| tome.has_machine(machine))
                        .unwrap_or(false);
                    if !present {
                        report = ProbeReport::degraded(format!("target machine '{machine}' is missing"));
                    }
                }
            }

            if report.status != HealthStatus::Healthy {
                warn!(
                    connection_id = %connection.id,
                    source_tome_id = %connection.source_tome_id,
                    target_tome_id = %connection.target_tome_id,
                    status = %report.status,
                    detail = ?report.detail,
                    "Connection health check not healthy"
                );
            }

            if let Some(mut stored) = self.connections.get_mut(&connection.id) {
                stored.health_status = report.status;
                stored.health_detail = report.detail.clone();
            }
            summary.record(report.status);
        }

        *self.last_health_check.lock() = Some(Utc::now());
        self.broker.track_message(
            &self.broker.generate_message_id(),
            &self.broker.generate_trace_id(),
            &self.broker.generate_span_id(),
            MessageMetadata::new(actions::HEALTH_CHECK).with_data(json!(summary)),
        );
        debug!(
            total = summary.total,
            healthy = summary.healthy,
            degraded = summary.degraded,
            unhealthy = summary.unhealthy,
            "Health check cycle complete"
        );
        summary
    }

    /// Structural issues plus shape warnings. Issues accumulate; the call
    /// reports everything wrong at once.
    pub fn validate_network(&self, structural: Option<&StructuralConfig>) -> NetworkValidation {
        let connections = self.get_connections();
        let issues = structural_issues(&connections, structural, self.registry.as_ref());

        let mut warnings: Vec<String> = cycle_nodes(&connections)
            .into_iter()
            .map(|node| format!("Circular dependency detected involving node: {node}"))
            .collect();
        warnings.extend(fan_out_warnings(&connections, self.config.max_fan_out));
        warnings.extend(amplification_warnings(&connections, self.config.max_event_amplification));
        if self.broker.is_enabled(toggles::ADVANCED_VALIDATION, &json!({})) {
            warnings.extend(high_frequency_warnings(&connections, Utc::now()));
        }

        let validation = NetworkValidation::from_parts(issues, warnings);
        log_connection_operation(
            "validate_network",
            None,
            None,
            None,
            if validation.valid { "valid" } else { "invalid" },
            Some(&format!(
                "{} issues, {} warnings",
                validation.issues.len(),
                validation.warnings.len()
            )),
        );
        validation
    }

    pub fn monitor_running(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .map(HealthMonitor::is_active)
            .unwrap_or(false)
    }

    /// Stop the monitor and disconnect everything
    pub fn destroy(&self) {
        self.stop_monitor();
        for connection in self.get_connections() {
            self.disconnect(&connection.id);
        }
        log_connection_operation("destroy", None, None, None, "destroyed", None);
    }

    fn validate_endpoints(&self, source_tome_id: &str, target_tome_id: &str, config: &ConnectionConfig) -> Result<()> {
        if source_tome_id.trim().is_empty() || target_tome_id.trim().is_empty() {
            return Err(TomeError::validation("sourceTome and targetTome are required"));
        }

        let source = self
            .registry
            .get_tome(source_tome_id)
            .map_err(|_| TomeError::validation(format!("Source tome {source_tome_id} is not registered")))?;
        let target = self
            .registry
            .get_tome(target_tome_id)
            .map_err(|_| TomeError::validation(format!("Target tome {target_tome_id} is not registered")))?;

        if let Some(machine) = &config.target_machine {
            if !target.has_machine(machine) {
                return Err(TomeError::validation(format!(
                    "Target tome {target_tome_id} has no machine '{machine}'"
                )));
            }
        }

        for (from, to) in &config.event_mapping {
            if from.is_empty() || to.is_empty() {
                return Err(TomeError::validation("Event mapping entries must be non-empty"));
            }
        }

        for (read, write) in &config.field_mapping {
            let read = FieldPath::parse(read)?;
            let write = FieldPath::parse(write)?;
            if !source.has_machine(read.machine_key) {
                return Err(TomeError::validation(format!(
                    "Field mapping reads from unknown machine '{}' in tome {source_tome_id}",
                    read.machine_key
                )));
            }
            if !target.has_machine(write.machine_key) {
                return Err(TomeError::validation(format!(
                    "Field mapping writes to unknown machine '{}' in tome {target_tome_id}",
                    write.machine_key
                )));
            }
        }
        Ok(())
    }

    fn insert_connection(&self, source_tome_id: &str, target_tome_id: &str, config: ConnectionConfig) -> String {
        let id = ids::generate_connection_id();
        let trace_id = config
            .custom_trace_id
            .clone()
            .unwrap_or_else(|| self.broker.generate_trace_id());
        let span_id = self.broker.generate_span_id();

        self.broker.track_message(
            &id,
            &trace_id,
            &span_id,
            MessageMetadata::new(actions::CONNECTION_CREATED).with_data(json!({
                "source": source_tome_id,
                "target": target_tome_id,
                "config": config,
            })),
        );

        let connection = Connection::new(id.clone(), source_tome_id, target_tome_id, config, trace_id, span_id);
        self.connections.insert(id.clone(), connection);
        self.order.lock().push(id.clone());

        log_connection_operation(
            "connect",
            Some(&id),
            Some(source_tome_id),
            Some(target_tome_id),
            "connected",
            None,
        );
        id
    }

    fn remove_connection(&self, connection_id: &str) -> Option<Connection> {
        let (_, connection) = self.connections.remove(connection_id)?;
        self.order.lock().retain(|id| id != connection_id);
        Some(connection)
    }

    /// Validate every pair, then create them; undo the ones created if any
    /// insertion fails
    fn build_all(&self, pairs: &[(&str, &str)], config: &ConnectionConfig) -> Result<Vec<String>> {
        for (source, target) in pairs {
            self.validate_endpoints(source, target, config)?;
        }
        // Endpoints can vanish between validation and insertion
        self.insert_all(pairs, config, |source, target| {
            self.validate_endpoints(source, target, config)
        })
    }

    fn insert_all<F>(&self, pairs: &[(&str, &str)], config: &ConnectionConfig, recheck: F) -> Result<Vec<String>>
    where
        F: Fn(&str, &str) -> Result<()>,
    {
        let mut created = Vec::<String>::with_capacity(pairs.len());
        for (source, target) in pairs {
            if let Err(err) = recheck(source, target) {
                for id in &created {
                    self.remove_connection(id.as_str());
                }
                warn!(rolled_back = created.len(), error = %err, "Bulk connection build rolled back");
                self.stop_monitor_if_idle();
                return Err(err);
            }
            created.push(self.insert_connection(source, target, config.clone()));
        }

        self.ensure_monitor();
        Ok(created)
    }

    #[allow(clippy::too_many_arguments)]
    fn forward(
        &self,
        connection: &Connection,
        direction: FlowDirection,
        source_tome_id: &str,
        event: &str,
        mapped: &str,
        data: &Value,
        trace_id: &str,
        report: &mut BroadcastReport,
    ) {
        let receiver = connection.receiver(direction);
        let tome = match self.registry.get_tome(receiver) {
            Ok(tome) => tome,
            Err(err) => {
                report.failures.push(DeliveryFailure {
                    connection_id: connection.id.clone(),
                    target_tome_id: receiver.to_string(),
                    machine_key: None,
                    error: err.to_string(),
                });
                return;
            }
        };

        for (read, write) in connection.field_pairs(direction) {
            if let Err(err) = self.transfer_field(source_tome_id, read, receiver, write) {
                report.failures.push(DeliveryFailure {
                    connection_id: connection.id.clone(),
                    target_tome_id: receiver.to_string(),
                    machine_key: FieldPath::parse(write).ok().map(|p| p.machine_key.to_string()),
                    error: err.to_string(),
                });
            }
        }

        let machines: Vec<String> = match connection.receiving_machine(direction) {
            Some(machine) => vec![machine.to_string()],
            None => tome.machine_keys().map(str::to_string).collect(),
        };

        for machine_key in machines {
            let span_id = self.broker.generate_span_id();
            let details = json!({
                "eventType": event,
                "mappedEvent": mapped,
                "source": source_tome_id,
                "target": receiver,
                "machine": machine_key,
                "direction": direction,
                "connectionId": connection.id,
            });

            match self.registry.apply_tome_message(receiver, &machine_key, mapped, data) {
                Ok(result) => {
                    report.pending.extend(result.outbox.into_iter().map(|request| PendingSend {
                        connection_id: connection.id.clone(),
                        target_tome_id: receiver.to_string(),
                        machine_key: machine_key.clone(),
                        request,
                    }));
                    self.broker.track_message(
                        &self.broker.generate_message_id(),
                        trace_id,
                        &span_id,
                        MessageMetadata::new(actions::EVENT_FORWARDED).with_data(details),
                    );
                    report.deliveries.push(Delivery {
                        connection_id: connection.id.clone(),
                        target_tome_id: receiver.to_string(),
                        machine_key,
                        event: mapped.to_string(),
                        direction,
                        outcome: result.outcome,
                        state: result.snapshot.state,
                    });
                }
                Err(err) => {
                    warn!(
                        connection_id = %connection.id,
                        target_tome_id = %receiver,
                        machine_key = %machine_key,
                        error = %err,
                        "Broadcast delivery failed"
                    );
                    self.broker.track_message(
                        &format!("{}{}", self.broker.generate_message_id(), system::ERROR_SUFFIX),
                        trace_id,
                        &span_id,
                        MessageMetadata::new(format!("{}{}", actions::EVENT_FORWARDED, system::ERROR_SUFFIX))
                            .with_data(json!({ "delivery": details, "error": err.to_string() }))
                            .with_direction(Direction::Error),
                    );
                    report.failures.push(DeliveryFailure {
                        connection_id: connection.id.clone(),
                        target_tome_id: receiver.to_string(),
                        machine_key: Some(machine_key),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Copy one mapped field. Returns false when the source has no value.
    fn transfer_field(&self, from_tome: &str, read: &str, to_tome: &str, write: &str) -> Result<bool> {
        let read = FieldPath::parse(read)?;
        let write = FieldPath::parse(write)?;

        let Some(value) = self
            .registry
            .machine_context_value(from_tome, read.machine_key, read.path)?
        else {
            return Ok(false);
        };
        self.registry
            .set_machine_context_path(to_tome, write.machine_key, write.path, value)?;
        Ok(true)
    }

    fn touch(&self, connection_id: &str) {
        if let Some(mut connection) = self.connections.get_mut(connection_id) {
            connection.last_activity = Utc::now();
        }
    }

    // Both monitor transitions read the connection count under the monitor
    // lock; connections are inserted or removed before the lock is taken.
    fn ensure_monitor(&self) {
        if !self.config.monitor_enabled {
            return;
        }
        let mut monitor = self.monitor.lock();
        if self.connections.is_empty() || monitor.as_ref().is_some_and(HealthMonitor::is_active) {
            return;
        }
        *monitor = HealthMonitor::spawn(self.weak_self.clone(), self.config.health_check_interval());
    }

    fn stop_monitor_if_idle(&self) {
        let monitor = {
            let mut guard = self.monitor.lock();
            if !self.connections.is_empty() {
                return;
            }
            guard.take()
        };
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
    }

    fn stop_monitor(&self) {
        let monitor = self.monitor.lock().take();
        if let Some(mut monitor) = monitor {
            monitor.stop();
        }
    }
}

impl Drop for ConnectionTopology {
    fn drop(&mut self) {
        if let Some(mut monitor) = self.monitor.get_mut().take() {
            monitor.stop();
        }
    }
}

impl TomeDirectory for TomeRegistry {
    fn has_tome(&self, tome_id: &str) -> bool {
        self.contains(tome_id)
    }

    fn has_machine(&self, tome_id: &str, machine_key: &str) -> bool {
        self.get_tome(tome_id)
            .map(|tome| tome.has_machine(machine_key))
            .unwrap_or(false)
    }

    fn has_route_path(&self, path: &str) -> bool {
        TomeRegistry::has_route_path(self, path)
    }
}

fn severity(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Unknown => 1,
        HealthStatus::Degraded => 2,
        HealthStatus::Unhealthy => 3,
    }
}

fn worse(a: ProbeReport, b: ProbeReport) -> ProbeReport {
    if severity(b.status) > severity(a.status) {
        b
    } else {
        a
    }
}
