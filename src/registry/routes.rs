//! # Route Binding Contract
//!
//! Types exchanged with the embedding HTTP layer: route declarations, the
//! request shape it hands to `TomeRegistry::deliver_route`, and the uniform
//! response `TomeRegistry::handle_route` produces.

use crate::error::TomeError;
use crate::messaging::BrokerResponse;
use crate::state_machine::{ApplyOutcome, MachineSnapshot, OutboundRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for HttpMethod {
    type Err = TomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(TomeError::validation(format!("Unsupported HTTP method: {s}"))),
        }
    }
}

/// Pure function applied to route input data or output results
pub type Transformer = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouteTransformers {
    pub input: Option<Transformer>,
    pub output: Option<Transformer>,
}

impl RouteTransformers {
    pub fn apply_input(&self, data: Value) -> Value {
        match &self.input {
            Some(transform) => transform(data),
            None => data,
        }
    }

    pub fn apply_output(&self, result: Value) -> Value {
        match &self.output {
            Some(transform) => transform(result),
            None => result,
        }
    }
}

impl fmt::Debug for RouteTransformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTransformers")
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

/// One routing-table entry as declared in a tome configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Path relative to the tome's base path
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Machine key within the tome
    pub machine: String,
    /// Event applied when the request body names none
    #[serde(default)]
    pub event: Option<String>,
    #[serde(skip)]
    pub transformers: RouteTransformers,
}

impl RouteConfig {
    pub fn new(method: HttpMethod, path: impl Into<String>, machine: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            machine: machine.into(),
            event: None,
            transformers: RouteTransformers::default(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_input_transformer<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transformers.input = Some(Arc::new(transform));
        self
    }

    pub fn with_output_transformer<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transformers.output = Some(Arc::new(transform));
        self
    }
}

/// A route resolved at registration time
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub tome_id: String,
    pub machine_key: String,
    pub method: HttpMethod,
    pub path: String,
    pub default_event: Option<String>,
    pub transformers: RouteTransformers,
}

impl RouteBinding {
    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            method: self.method,
            path: self.path.clone(),
            tome_id: self.tome_id.clone(),
            machine_key: self.machine_key.clone(),
            event: self.default_event.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    pub method: HttpMethod,
    pub path: String,
    pub tome_id: String,
    pub machine_key: String,
    pub event: Option<String>,
}

/// Normalize a route path: leading slash, no trailing slash, no empty segments
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join a tome base path and a route path
pub fn join_paths(base: &str, path: &str) -> String {
    normalize_path(&format!("{base}/{path}"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteBody {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub body: RouteBody,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RouteRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RouteBody::default(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.body.event = Some(event.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.body.data = data;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Successful route delivery
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub tome_id: String,
    pub machine_key: String,
    pub event: String,
    pub snapshot: MachineSnapshot,
    pub outcome: ApplyOutcome,
    /// Snapshot after the output transformer
    pub result: Value,
    /// Trace the machine's broker sends ran in
    pub trace_id: String,
    pub sent: Vec<BrokerResponse>,
    /// Requests left unsent because the registry has no broker
    pub unsent: Vec<OutboundRequest>,
}

/// Uniform response for the embedding HTTP layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub success: bool,
    pub tome: Option<String>,
    pub machine: Option<String>,
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub span_id: String,
    pub duration_ms: u64,
}

impl RouteResponse {
    /// HTTP status the embedding layer should answer with
    pub fn status_code(&self) -> u16 {
        if self.success {
            return 200;
        }
        match self.error_kind.as_deref() {
            Some("validation_error") => 400,
            Some("not_found") | Some("route_not_found") => 404,
            _ => 500,
        }
    }
}
