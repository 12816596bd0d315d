//! # Message Broker
//!
//! Stamps outbound backend calls with message, trace and span ids, records
//! every outbound/response/error message, and reconstructs traces from the
//! trace index.
//!
//! History is append-only and unbounded until [`MessageBroker::clear_history`]
//! is called; retention policy belongs to the embedding application.

use super::errors::{MessagingError, MessagingResult};
use super::ids;
use super::message::{BackendKind, Direction, Message, MessageMetadata, TraceInfo};
use super::toggles::{BackendResolver, BackendTarget, StaticToggles, ToggleBackendResolver, ToggleEvaluator};
use super::transport::{OfflineTransport, Transport, TransportRequest};
use crate::config::BrokerConfig;
use crate::constants::{headers, system, toggles};
use crate::logging::log_broker_message;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend result of a traced send, with the ids it was stamped with
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerResponse {
    pub message_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub backend: BackendKind,
    pub body: Value,
}

pub struct MessageBroker {
    config: BrokerConfig,
    transport: Arc<dyn Transport>,
    toggles: Arc<dyn ToggleEvaluator>,
    resolver: Arc<dyn BackendResolver>,
    messages: DashMap<String, Message>,
    trace_index: DashMap<String, Vec<String>>,
    /// Message ids and first-seen trace ids in insertion order; appends are
    /// serialized under this lock so the indexes never disagree
    order: Mutex<InsertionOrder>,
}

#[derive(Debug, Default)]
struct InsertionOrder {
    messages: Vec<String>,
    traces: Vec<String>,
}

impl MessageBroker {
    /// Broker with the toggle-driven backend resolver built from `config`
    pub fn new(
        config: BrokerConfig,
        transport: Arc<dyn Transport>,
        toggles: Arc<dyn ToggleEvaluator>,
    ) -> Self {
        let resolver = Arc::new(
            ToggleBackendResolver::new(
                Arc::clone(&toggles),
                config.primary_url.clone(),
                config.fallback_url.clone(),
            )
            .with_toggle_name(config.primary_toggle.clone()),
        );
        Self::with_resolver(config, transport, toggles, resolver)
    }

    pub fn with_resolver(
        config: BrokerConfig,
        transport: Arc<dyn Transport>,
        toggles: Arc<dyn ToggleEvaluator>,
        resolver: Arc<dyn BackendResolver>,
    ) -> Self {
        Self {
            config,
            transport,
            toggles,
            resolver,
            messages: DashMap::new(),
            trace_index: DashMap::new(),
            order: Mutex::new(InsertionOrder::default()),
        }
    }

    /// Broker with no backend and every toggle off; sends fail and are recorded
    pub fn offline() -> Self {
        Self::new(
            BrokerConfig::default(),
            Arc::new(OfflineTransport),
            Arc::new(StaticToggles::new()),
        )
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn generate_message_id(&self) -> String {
        ids::generate_message_id()
    }

    pub fn generate_trace_id(&self) -> String {
        ids::generate_trace_id()
    }

    pub fn generate_span_id(&self) -> String {
        ids::generate_span_id()
    }

    pub fn is_enabled(&self, toggle: &str, context: &Value) -> bool {
        self.toggles.is_enabled(toggle, context)
    }

    pub fn resolve_backend(&self) -> BackendTarget {
        self.resolver.resolve_backend()
    }

    /// Send `action` to the resolved backend in a fresh trace
    pub async fn send(&self, action: &str, payload: Value) -> MessagingResult<Value> {
        self.send_traced(action, payload, None).await.map(|r| r.body)
    }

    /// Send `action`, continuing `trace_id` when given.
    ///
    /// The outbound message is recorded before the transport call and a
    /// `_response` or `_error` message after it. Transport failures and non-2xx
    /// statuses are recorded, then returned to the caller.
    pub async fn send_traced(
        &self,
        action: &str,
        payload: Value,
        trace_id: Option<&str>,
    ) -> MessagingResult<BrokerResponse> {
        if action.trim().is_empty() {
            return Err(MessagingError::invalid_request("action must not be empty"));
        }

        let message_id = self.generate_message_id();
        let trace_id = trace_id
            .map(str::to_string)
            .unwrap_or_else(|| self.generate_trace_id());
        let span_id = self.generate_span_id();
        let backend = self.resolve_backend();

        self.track_message(
            &message_id,
            &trace_id,
            &span_id,
            MessageMetadata::new(action)
                .with_backend(backend.kind)
                .with_data(payload.clone())
                .with_direction(Direction::Outbound),
        );

        let url = self.action_url(&backend.base_url, action);
        let request = TransportRequest::post(&url, Self::stamp_body(payload, &message_id, &trace_id, &span_id))
            .with_headers(self.tracing_headers(&trace_id, &span_id, &message_id));

        let outcome = match self.transport.send(request).await {
            Ok(response) if response.is_success() => Ok(response.body),
            Ok(response) => Err(MessagingError::http_status(
                &url,
                response.status,
                response.body.to_string(),
            )),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(body) => {
                self.track_message(
                    &format!("{message_id}{}", system::RESPONSE_SUFFIX),
                    &trace_id,
                    &span_id,
                    MessageMetadata::new(format!("{action}{}", system::RESPONSE_SUFFIX))
                        .with_backend(backend.kind)
                        .with_data(body.clone())
                        .with_direction(Direction::Response),
                );
                Ok(BrokerResponse {
                    message_id,
                    trace_id,
                    span_id,
                    backend: backend.kind,
                    body,
                })
            }
            Err(err) => {
                warn!(
                    action = %action,
                    trace_id = %trace_id,
                    error = %err,
                    "Backend send failed"
                );
                self.track_message(
                    &format!("{message_id}{}", system::ERROR_SUFFIX),
                    &trace_id,
                    &span_id,
                    MessageMetadata::new(format!("{action}{}", system::ERROR_SUFFIX))
                        .with_backend(backend.kind)
                        .with_data(json!({ "error": err.to_string() }))
                        .with_direction(Direction::Error),
                );
                Err(err)
            }
        }
    }

    /// Look a trace up on the backend, falling back to the local reconstruction
    /// when the backend cannot answer
    pub async fn fetch_trace(&self, trace_id: &str) -> Value {
        let backend = self.resolve_backend();
        let url = format!(
            "{}/{}/{}",
            backend.base_url.trim_end_matches('/'),
            self.config.trace_path.trim_matches('/'),
            trace_id
        );

        match self.transport.send(TransportRequest::get(&url)).await {
            Ok(response) if response.is_success() => response.body,
            outcome => {
                debug!(trace_id = %trace_id, url = %url, ?outcome, "Remote trace lookup failed, using local history");
                serde_json::to_value(self.get_full_trace(trace_id)).unwrap_or(Value::Null)
            }
        }
    }

    /// Record a message without a network call.
    ///
    /// Recording an id that already exists keeps the original message and
    /// returns it unchanged.
    pub fn track_message(
        &self,
        message_id: &str,
        trace_id: &str,
        span_id: &str,
        metadata: MessageMetadata,
    ) -> Message {
        let message = Message {
            id: message_id.to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            timestamp: Utc::now(),
            backend: metadata.backend.unwrap_or_default(),
            action: metadata.action.unwrap_or_else(|| "unknown".to_string()),
            payload: metadata.data.unwrap_or(Value::Null),
            direction: metadata
                .direction
                .unwrap_or_else(|| Direction::from_message_id(message_id)),
        };

        let mut order = self.order.lock();
        if let Some(existing) = self.messages.get(message_id) {
            warn!(message_id = %message_id, "Message id already recorded, keeping original");
            return existing.clone();
        }

        self.messages.insert(message.id.clone(), message.clone());
        let mut trace = self.trace_index.entry(message.trace_id.clone()).or_default();
        if trace.is_empty() {
            order.traces.push(message.trace_id.clone());
        }
        trace.push(message.id.clone());
        drop(trace);
        order.messages.push(message.id.clone());
        drop(order);

        log_broker_message(&message.action, &message.id, &message.trace_id, message.direction);
        message
    }

    pub fn get_message(&self, message_id: &str) -> Option<Message> {
        self.messages.get(message_id).map(|m| m.clone())
    }

    /// Messages of a trace in insertion order
    pub fn get_trace_messages(&self, trace_id: &str) -> Vec<Message> {
        let ids = match self.trace_index.get(trace_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get_message(id)).collect()
    }

    pub fn get_full_trace(&self, trace_id: &str) -> TraceInfo {
        TraceInfo::from_messages(trace_id, self.get_trace_messages(trace_id))
    }

    /// Every recorded message in insertion order
    pub fn message_history(&self) -> Vec<Message> {
        let ids = self.order.lock().messages.clone();
        ids.iter().filter_map(|id| self.get_message(id)).collect()
    }

    /// Trace ids in the order they were first seen
    pub fn trace_ids(&self) -> Vec<String> {
        self.order.lock().traces.clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn clear_history(&self) {
        let mut order = self.order.lock();
        self.messages.clear();
        self.trace_index.clear();
        order.messages.clear();
        order.traces.clear();
        debug!("Message history cleared");
    }

    /// Trace propagation headers; vendor headers only when their toggle is on
    pub fn tracing_headers(&self, trace_id: &str, span_id: &str, message_id: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(headers::CONTENT_TYPE.to_string(), "application/json".to_string());
        map.insert(headers::TRACE_ID.to_string(), trace_id.to_string());
        map.insert(headers::SPAN_ID.to_string(), span_id.to_string());
        map.insert(headers::MESSAGE_ID.to_string(), message_id.to_string());

        if self.is_enabled(toggles::VENDOR_HEADERS, &Value::Null) {
            map.insert(headers::DATADOG_TRACE_ID.to_string(), trace_id.to_string());
            map.insert(headers::DATADOG_PARENT_ID.to_string(), span_id.to_string());
            map.insert(headers::DATADOG_SAMPLING_PRIORITY.to_string(), "1".to_string());
        }
        map
    }

    fn action_url(&self, base_url: &str, action: &str) -> String {
        let prefix = self.config.path_prefix.trim_matches('/');
        let base = base_url.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{base}/{action}")
        } else {
            format!("{base}/{prefix}/{action}")
        }
    }

    /// Payload object merged with the trace ids; non-object payloads are
    /// wrapped under `data`
    fn stamp_body(payload: Value, message_id: &str, trace_id: &str, span_id: &str) -> Value {
        let mut body = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        body.insert("messageId".to_string(), json!(message_id));
        body.insert("traceId".to_string(), json!(trace_id));
        body.insert("spanId".to_string(), json!(span_id));
        Value::Object(body)
    }
}

impl std::fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBroker")
            .field("config", &self.config)
            .field("transport", &self.transport.description())
            .field("message_count", &self.messages.len())
            .finish()
    }
}
