//! # Topology Admin Handlers
//!
//! Transport-agnostic handlers for the topology management surface. The
//! embedding HTTP layer forwards method, path, body and headers to
//! [`TopologyApi::handle`] and answers with the returned envelope.
//!
//! Paths may carry an `/api` prefix; it is stripped before matching.

use super::response_types::{ApiError, ApiRequest, ApiResponse};
use crate::constants::{actions, headers};
use crate::messaging::{ids, MessageMetadata};
use crate::registry::HttpMethod;
use crate::topology::{ConnectionConfig, ConnectionTopology, StructuralConfig};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

type HandlerResult = Result<Value, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConnectionBody {
    source_tome: Option<String>,
    target_tome: Option<String>,
    #[serde(default)]
    config: ConnectionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RingNetworkBody {
    #[serde(default)]
    tomes: Vec<String>,
    #[serde(default)]
    config: ConnectionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubNetworkBody {
    hub_tome: Option<String>,
    #[serde(default)]
    spoke_tomes: Vec<String>,
    #[serde(default)]
    config: ConnectionConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastBody {
    event: Option<String>,
    source_tome: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    structural: Option<StructuralConfig>,
}

/// Outcome of the last health check served through the API
#[derive(Debug, Clone)]
struct LastHealthCheck {
    timestamp: DateTime<Utc>,
    status: String,
}

#[derive(Debug)]
pub struct TopologyApi {
    topology: Arc<ConnectionTopology>,
    api_calls: AtomicU64,
    last_health_check: Mutex<Option<LastHealthCheck>>,
}

impl TopologyApi {
    pub fn new(topology: Arc<ConnectionTopology>) -> Self {
        Self {
            topology,
            api_calls: AtomicU64::new(0),
            last_health_check: Mutex::new(None),
        }
    }

    pub fn topology(&self) -> &Arc<ConnectionTopology> {
        &self.topology
    }

    pub fn api_call_count(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Route and run one admin request. Never fails: errors come back as a
    /// `success: false` envelope carrying the request's trace context.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let started = Instant::now();
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        let trace_id = request
            .header(headers::TRACE_ID)
            .map(str::to_string)
            .unwrap_or_else(ids::generate_trace_id);
        let span_id = request
            .header(headers::SPAN_ID)
            .map(str::to_string)
            .unwrap_or_else(ids::generate_span_id);

        let path = strip_api_prefix(&request.path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let outcome = match (request.method, segments.as_slice()) {
            (HttpMethod::Post, ["connections"]) => self.create_connection(&request.body, &trace_id, &span_id),
            (HttpMethod::Get, ["connections"]) => self.list_connections(),
            (HttpMethod::Get, ["connections", id]) => self.get_connection(id),
            (HttpMethod::Delete, ["connections", id]) => self.delete_connection(id),
            (HttpMethod::Post, ["connections", id, "sync"]) => self.sync_connection(id),
            (HttpMethod::Get, ["topology"]) => self.get_topology(),
            (HttpMethod::Post, ["networks", "ring"]) => self.create_ring(&request.body),
            (HttpMethod::Post, ["networks", "hub"]) => self.create_hub(&request.body),
            (HttpMethod::Get, ["health"]) => self.health(),
            (HttpMethod::Get, ["metrics"]) => self.metrics(),
            (HttpMethod::Post, ["broadcast"]) => self.broadcast(&request.body).await,
            (HttpMethod::Post, ["validate"]) => self.validate(&request.body),
            (HttpMethod::Get, ["tomes"]) => self.list_tomes(),
            (HttpMethod::Get, ["traces", trace]) => Ok(self.get_trace(trace).await),
            _ => {
                let response = ApiResponse::failure(
                    &ApiError::route_not_found(request.method, &request.path),
                    trace_id,
                    span_id,
                    0,
                );
                debug!(method = %request.method, path = %request.path, "Admin route not found");
                return response;
            }
        };

        let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(data) => ApiResponse::ok(data, trace_id, span_id, duration),
            Err(err) => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    trace_id = %trace_id,
                    error = %err,
                    "Admin request failed"
                );
                ApiResponse::failure(&err, trace_id, span_id, duration)
            }
        }
    }

    fn create_connection(&self, body: &Value, trace_id: &str, span_id: &str) -> HandlerResult {
        let body: CreateConnectionBody = parse_body(body)?;
        let (Some(source), Some(target)) = (body.source_tome, body.target_tome) else {
            return Err(ApiError::bad_request("sourceTome and targetTome are required"));
        };

        let connection_id = self.topology.connect(&source, &target, body.config.clone())?;
        self.topology.broker().track_message(
            &ids::generate_id("api"),
            trace_id,
            span_id,
            MessageMetadata::new(actions::API_CONNECTION_CREATED).with_data(json!({
                "connectionId": connection_id,
                "sourceTome": source,
                "targetTome": target,
                "config": body.config,
            })),
        );
        Ok(json!({ "connectionId": connection_id }))
    }

    fn list_connections(&self) -> HandlerResult {
        Ok(json!({ "connections": self.topology.get_connections() }))
    }

    fn get_connection(&self, id: &str) -> HandlerResult {
        let connection = self
            .topology
            .get_connection(id)
            .ok_or_else(|| ApiError::not_found("Connection"))?;
        Ok(json!({ "connection": connection }))
    }

    fn delete_connection(&self, id: &str) -> HandlerResult {
        Ok(json!({ "disconnected": self.topology.disconnect(id) }))
    }

    fn sync_connection(&self, id: &str) -> HandlerResult {
        let report = self.topology.sync_state(id)?;
        Ok(json!({ "sync": report }))
    }

    fn get_topology(&self) -> HandlerResult {
        Ok(json!({ "topology": self.topology.get_network_topology() }))
    }

    fn create_ring(&self, body: &Value) -> HandlerResult {
        let body: RingNetworkBody = parse_body(body)?;
        if body.tomes.len() < 2 {
            return Err(ApiError::bad_request("At least 2 tomes are required for ring network"));
        }
        let connection_ids = self.topology.create_network(&body.tomes, &body.config)?;
        Ok(json!({ "connectionIds": connection_ids, "networkType": "ring" }))
    }

    fn create_hub(&self, body: &Value) -> HandlerResult {
        let body: HubNetworkBody = parse_body(body)?;
        let Some(hub) = body.hub_tome.filter(|_| !body.spoke_tomes.is_empty()) else {
            return Err(ApiError::bad_request("hubTome and spokeTomes array are required"));
        };
        let connection_ids = self
            .topology
            .create_hub_network(&hub, &body.spoke_tomes, &body.config)?;
        Ok(json!({ "connectionIds": connection_ids, "networkType": "hub-and-spoke" }))
    }

    fn health(&self) -> HandlerResult {
        let report = self.topology.network_health();
        *self.last_health_check.lock() = Some(LastHealthCheck {
            timestamp: report.timestamp,
            status: report.status.to_string(),
        });
        Ok(json!(report))
    }

    fn metrics(&self) -> HandlerResult {
        let broker = self.topology.broker();
        let last_health_check = self.last_health_check.lock().clone().map(|check| {
            json!({ "timestamp": check.timestamp, "status": check.status })
        });

        Ok(json!({
            "metrics": {
                "connections": self.topology.connection_count(),
                "topology": self.topology.get_network_topology(),
                "broker": {
                    "messageCount": broker.message_count(),
                    "traceCount": broker.trace_ids().len(),
                },
                "api": {
                    "apiCallCount": self.api_call_count(),
                    "lastHealthCheck": last_health_check,
                },
                "registry": {
                    "tomes": self.topology.registry().tome_count(),
                    "routes": self.topology.registry().routes().len(),
                },
            }
        }))
    }

    async fn broadcast(&self, body: &Value) -> HandlerResult {
        let body: BroadcastBody = parse_body(body)?;
        let (Some(event), Some(source)) = (body.event, body.source_tome) else {
            return Err(ApiError::bad_request("event and sourceTome are required"));
        };
        let report = self
            .topology
            .dispatch_broadcast(&event, &source, &body.data)
            .await?;
        Ok(json!({ "message": "Event broadcasted successfully", "report": report }))
    }

    fn validate(&self, body: &Value) -> HandlerResult {
        let body: ValidateBody = parse_body(body)?;
        let validation = self.topology.validate_network(body.structural.as_ref());
        Ok(json!({ "validation": validation }))
    }

    fn list_tomes(&self) -> HandlerResult {
        Ok(json!({ "tomes": self.topology.registry().get_tome_status() }))
    }

    async fn get_trace(&self, trace_id: &str) -> Value {
        json!({ "trace": self.topology.broker().fetch_trace(trace_id).await })
    }
}

fn strip_api_prefix(path: &str) -> &str {
    match path.strip_prefix("/api") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Deserialize a request body; a missing body means "all defaults"
fn parse_body<T: DeserializeOwned + Default>(body: &Value) -> Result<T, ApiError> {
    if body.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(body.clone()).map_err(|err| ApiError::bad_request(format!("Invalid request body: {err}")))
}
