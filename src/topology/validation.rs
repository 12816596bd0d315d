//! # Network Validation
//!
//! Structural checks over the connection graph. Issues make a network
//! invalid; warnings flag shapes that tend to misbehave at runtime (cycles,
//! heavy fan-out, repeated event mappings) without failing validation.

use super::connection::Connection;
use crate::constants::system;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Application structure declared outside the registry: navigation entries
/// and the routes they point at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralConfig {
    #[serde(default)]
    pub routes: Vec<StructuralRoute>,
    #[serde(default)]
    pub navigation: Vec<NavigationItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralRoute {
    pub path: String,
    /// Tome serving the route, if any
    #[serde(default)]
    pub tome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationItem {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A connection endpoint no longer resolves to a registered tome
    DanglingEndpoint,
    /// A connection's target machine no longer exists in the target tome
    MissingMachine,
    /// A navigation item points at a path no route declares
    UndeclaredRoute,
    /// A structural route names a tome that is not registered
    UnknownTome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            connection_id: None,
        }
    }

    pub fn for_connection(kind: IssueKind, connection_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            connection_id: Some(connection_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkValidation {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
}

impl NetworkValidation {
    pub fn from_parts(issues: Vec<ValidationIssue>, warnings: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
            warnings,
        }
    }
}

/// Lookups the structural checks need from the registry
pub trait TomeDirectory {
    fn has_tome(&self, tome_id: &str) -> bool;
    fn has_machine(&self, tome_id: &str, machine_key: &str) -> bool;
    fn has_route_path(&self, path: &str) -> bool;
}

/// Every structural issue, accumulated rather than stopping at the first
pub fn structural_issues(
    connections: &[Connection],
    structural: Option<&StructuralConfig>,
    directory: &dyn TomeDirectory,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for connection in connections {
        for endpoint in [&connection.source_tome_id, &connection.target_tome_id] {
            if !directory.has_tome(endpoint) {
                issues.push(ValidationIssue::for_connection(
                    IssueKind::DanglingEndpoint,
                    &connection.id,
                    format!("Connection {} references unregistered tome {endpoint}", connection.id),
                ));
            }
        }

        if let Some(machine) = &connection.target_machine {
            if directory.has_tome(&connection.target_tome_id)
                && !directory.has_machine(&connection.target_tome_id, machine)
            {
                issues.push(ValidationIssue::for_connection(
                    IssueKind::MissingMachine,
                    &connection.id,
                    format!(
                        "Connection {} targets machine '{machine}' which tome {} does not have",
                        connection.id, connection.target_tome_id
                    ),
                ));
            }
        }
    }

    let Some(structural) = structural else {
        return issues;
    };

    for route in &structural.routes {
        if let Some(tome) = &route.tome {
            if !directory.has_tome(tome) {
                issues.push(ValidationIssue::new(
                    IssueKind::UnknownTome,
                    format!("Route {} references unregistered tome {tome}", route.path),
                ));
            }
        }
    }

    let structural_paths: BTreeSet<&str> = structural.routes.iter().map(|r| r.path.as_str()).collect();
    for item in &structural.navigation {
        if !structural_paths.contains(item.path.as_str()) && !directory.has_route_path(&item.path) {
            issues.push(ValidationIssue::new(
                IssueKind::UndeclaredRoute,
                format!("Navigation item {} points at undeclared route {}", item.id, item.path),
            ));
        }
    }

    issues
}

/// Tomes that sit on a cycle. Bidirectional connections are walked both ways,
/// but a single bidirectional connection does not form a cycle on its own.
pub fn cycle_nodes(connections: &[Connection]) -> BTreeSet<String> {
    let mut adjacency: BTreeMap<&str, Vec<(&str, usize)>> = BTreeMap::new();
    for (index, connection) in connections.iter().enumerate() {
        adjacency
            .entry(connection.source_tome_id.as_str())
            .or_default()
            .push((connection.target_tome_id.as_str(), index));
        if connection.bidirectional {
            adjacency
                .entry(connection.target_tome_id.as_str())
                .or_default()
                .push((connection.source_tome_id.as_str(), index));
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Active,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        via: Option<usize>,
        adjacency: &BTreeMap<&'a str, Vec<(&'a str, usize)>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        found: &mut BTreeSet<String>,
    ) {
        marks.insert(node, Mark::Active);
        path.push(node);

        for &(next, edge) in adjacency.get(node).into_iter().flatten() {
            if Some(edge) == via {
                continue;
            }
            match marks.get(next) {
                Some(Mark::Active) => {
                    if let Some(start) = path.iter().position(|n| *n == next) {
                        found.extend(path[start..].iter().map(|n| n.to_string()));
                    }
                }
                Some(Mark::Done) => {}
                None => visit(next, Some(edge), adjacency, marks, path, found),
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
    }

    let mut marks = HashMap::new();
    let mut found = BTreeSet::new();
    let mut path = Vec::new();
    for &node in adjacency.keys() {
        if !marks.contains_key(node) {
            visit(node, None, &adjacency, &mut marks, &mut path, &mut found);
        }
    }
    found
}

/// Outgoing connection count per tome above `threshold`
pub fn fan_out_warnings(connections: &[Connection], threshold: usize) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for connection in connections {
        *counts.entry(connection.source_tome_id.as_str()).or_default() += 1;
        if connection.bidirectional {
            *counts.entry(connection.target_tome_id.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(node, count)| format!("High fan-out detected for node {node}: {count} connections"))
        .collect()
}

/// The same `source->target` event pair mapped by more than `threshold`
/// connections
pub fn amplification_warnings(connections: &[Connection], threshold: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for connection in connections {
        for (source, target) in &connection.event_mapping {
            *counts.entry(format!("{source}->{target}")).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(pair, count)| format!("Potential event amplification detected: {pair} appears {count} times"))
        .collect()
}

/// Long-lived connections that carried traffic within the last second
pub fn high_frequency_warnings(connections: &[Connection], now: DateTime<Utc>) -> Vec<String> {
    let busy = connections
        .iter()
        .filter(|c| {
            (now - c.created_at).num_seconds() > system::HIGH_FREQUENCY_MIN_AGE_SECONDS
                && (now - c.last_activity).num_milliseconds() < system::HIGH_FREQUENCY_MAX_IDLE_MS
        })
        .count();

    if busy == 0 {
        Vec::new()
    } else {
        vec![format!(
            "High frequency connections detected: {busy} connections showing high activity"
        )]
    }
}
