//! # Admin API Types
//!
//! Request and response envelopes for the topology management surface, and
//! the error type handlers return before it is folded into the envelope.

use crate::error::TomeError;
use crate::registry::HttpMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by admin handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Route not found: {route}")]
    RouteNotFound { route: String },

    #[error(transparent)]
    Component(#[from] TomeError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn route_not_found(method: HttpMethod, path: &str) -> Self {
        Self::RouteNotFound {
            route: format!("{method} {path}"),
        }
    }

    /// Machine-readable error category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::Component(err) => err.category(),
        }
    }

    /// HTTP status the embedding layer should answer with
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            "validation_error" => 400,
            "not_found" | "route_not_found" => 404,
            "transport_error" => 502,
            _ => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Value::Null,
            headers: BTreeMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
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

/// Uniform admin response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub status_code: u16,
    pub trace_id: String,
    pub span_id: String,
    pub timestamp: DateTime<Utc>,
    /// Handler time in milliseconds
    pub duration: u64,
}

impl ApiResponse {
    pub fn ok(data: Value, trace_id: String, span_id: String, duration: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            status_code: 200,
            trace_id,
            span_id,
            timestamp: Utc::now(),
            duration,
        }
    }

    pub fn failure(error: &ApiError, trace_id: String, span_id: String, duration: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            status_code: error.status_code(),
            trace_id,
            span_id,
            timestamp: Utc::now(),
            duration,
        }
    }

    /// Field of `data`, for callers that only need one value
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}
