//! # Connections
//!
//! A connection is a directed link between two tomes carrying an event
//! mapping, a field mapping and a health status.

use crate::constants::HealthStatus;
use crate::error::{Result, TomeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFilters {
    /// When set, only these source events are forwarded
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

impl ConnectionFilters {
    pub fn allows(&self, event: &str) -> bool {
        match &self.events {
            Some(events) => events.iter().any(|e| e == event),
            None => true,
        }
    }
}

/// Options accepted by `connect` and the bulk builders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Source event -> target event
    #[serde(default)]
    pub event_mapping: BTreeMap<String, String>,
    /// `machineKey.path` in the source -> `machineKey.path` in the target
    #[serde(default, alias = "stateMapping")]
    pub field_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub filters: ConnectionFilters,
    /// Deliver only to this machine of the target tome
    #[serde(default)]
    pub target_machine: Option<String>,
    /// Trace the connection under this id instead of a generated one
    #[serde(default)]
    pub custom_trace_id: Option<String>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_event(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.event_mapping.insert(source.into(), target.into());
        self
    }

    pub fn map_field(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.field_mapping.insert(source.into(), target.into());
        self
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn with_event_filter<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_target_machine(mut self, machine_key: impl Into<String>) -> Self {
        self.target_machine = Some(machine_key.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.custom_trace_id = Some(trace_id.into());
        self
    }
}

/// Traversal direction of a connection during broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Forward,
    Backward,
}

/// A field-mapping endpoint: machine key plus dotted context path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath<'a> {
    pub machine_key: &'a str,
    pub path: &'a str,
}

impl<'a> FieldPath<'a> {
    pub fn parse(raw: &'a str) -> Result<Self> {
        match raw.split_once('.') {
            Some((machine_key, path)) if !machine_key.is_empty() && !path.is_empty() => {
                Ok(Self { machine_key, path })
            }
            _ => Err(TomeError::validation(format!(
                "Field mapping '{raw}' must have the form machineKey.path"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_tome_id: String,
    pub target_tome_id: String,
    pub event_mapping: BTreeMap<String, String>,
    pub field_mapping: BTreeMap<String, String>,
    pub bidirectional: bool,
    pub filters: ConnectionFilters,
    pub target_machine: Option<String>,
    pub health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_detail: Option<String>,
    pub trace_id: String,
    pub span_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        id: String,
        source_tome_id: &str,
        target_tome_id: &str,
        config: ConnectionConfig,
        trace_id: String,
        span_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_tome_id: source_tome_id.to_string(),
            target_tome_id: target_tome_id.to_string(),
            event_mapping: config.event_mapping,
            field_mapping: config.field_mapping,
            bidirectional: config.bidirectional,
            filters: config.filters,
            target_machine: config.target_machine,
            health_status: HealthStatus::Unknown,
            health_detail: None,
            trace_id,
            span_id,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn touches(&self, tome_id: &str) -> bool {
        self.source_tome_id == tome_id || self.target_tome_id == tome_id
    }

    /// How a broadcast from `tome_id` traverses this connection, if at all
    pub fn direction_from(&self, tome_id: &str) -> Option<FlowDirection> {
        if self.source_tome_id == tome_id {
            Some(FlowDirection::Forward)
        } else if self.bidirectional && self.target_tome_id == tome_id {
            Some(FlowDirection::Backward)
        } else {
            None
        }
    }

    /// Tome that receives a delivery travelling in `direction`
    pub fn receiver(&self, direction: FlowDirection) -> &str {
        match direction {
            FlowDirection::Forward => &self.target_tome_id,
            FlowDirection::Backward => &self.source_tome_id,
        }
    }

    /// Map `event` for `direction`; backward uses the reversed mapping
    pub fn map_event(&self, event: &str, direction: FlowDirection) -> Option<&str> {
        match direction {
            FlowDirection::Forward => self.event_mapping.get(event).map(String::as_str),
            FlowDirection::Backward => self
                .event_mapping
                .iter()
                .find(|(_, target)| target.as_str() == event)
                .map(|(source, _)| source.as_str()),
        }
    }

    /// Field pairs `(read_from, write_to)` for `direction`
    pub fn field_pairs(&self, direction: FlowDirection) -> Vec<(&str, &str)> {
        self.field_mapping
            .iter()
            .map(|(source, target)| match direction {
                FlowDirection::Forward => (source.as_str(), target.as_str()),
                FlowDirection::Backward => (target.as_str(), source.as_str()),
            })
            .collect()
    }

    /// Machine that receives deliveries in `direction`. Backward deliveries
    /// go to every machine of the original source.
    pub fn receiving_machine(&self, direction: FlowDirection) -> Option<&str> {
        match direction {
            FlowDirection::Forward => self.target_machine.as_deref(),
            FlowDirection::Backward => None,
        }
    }
}
