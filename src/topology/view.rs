//! # Topology Views
//!
//! Serializable projections of the connection graph returned to operators.

use super::connection::Connection;
use crate::constants::{HealthStatus, NetworkHealth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub bidirectional: bool,
    pub health_status: HealthStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub trace_id: String,
}

impl From<&Connection> for TopologyEdge {
    fn from(connection: &Connection) -> Self {
        Self {
            id: connection.id.clone(),
            from: connection.source_tome_id.clone(),
            to: connection.target_tome_id.clone(),
            bidirectional: connection.bidirectional,
            health_status: connection.health_status,
            created_at: connection.created_at,
            last_activity: connection.last_activity,
            trace_id: connection.trace_id.clone(),
        }
    }
}

/// Connection counts by health status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}

impl HealthSummary {
    pub fn record(&mut self, status: HealthStatus) {
        self.total += 1;
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

impl FromIterator<HealthStatus> for HealthSummary {
    fn from_iter<I: IntoIterator<Item = HealthStatus>>(iter: I) -> Self {
        let mut summary = Self::default();
        for status in iter {
            summary.record(status);
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTopology {
    /// Every tome that appears as an endpoint, sorted
    pub nodes: Vec<String>,
    /// One edge per connection, in creation order
    pub edges: Vec<TopologyEdge>,
    pub metrics: HealthSummary,
}

impl NetworkTopology {
    pub fn from_connections<'a, I>(connections: I) -> Self
    where
        I: IntoIterator<Item = &'a Connection>,
    {
        let mut nodes = BTreeSet::new();
        let mut edges = Vec::new();
        let mut metrics = HealthSummary::default();

        for connection in connections {
            nodes.insert(connection.source_tome_id.clone());
            nodes.insert(connection.target_tome_id.clone());
            metrics.record(connection.health_status);
            edges.push(TopologyEdge::from(connection));
        }

        Self {
            nodes: nodes.into_iter().collect(),
            edges,
            metrics,
        }
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|edge| edge.from == from && edge.to == to)
    }
}

/// Aggregate network health as served by the admin surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealthReport {
    pub status: NetworkHealth,
    pub connections: HealthSummary,
    pub last_check: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}
