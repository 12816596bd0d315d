//! # Transport Collaborators
//!
//! The broker only needs `send(url, method, headers, body) -> {status, json}`.
//! [`HttpTransport`] implements it over `reqwest`; embedding applications and
//! tests can supply any other implementation.

use super::errors::{MessagingError, MessagingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportRequest {
    pub url: String,
    pub method: TransportMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            method: TransportMethod::Post,
            headers: BTreeMap::new(),
            body: Some(body),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: TransportMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> &Value {
        &self.body
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request. Non-2xx statuses are returned, not raised; the
    /// broker decides what counts as failure.
    async fn send(&self, request: TransportRequest) -> MessagingResult<TransportResponse>;

    /// Get a description of this transport for logging
    fn description(&self) -> &'static str;
}

/// `reqwest`-backed HTTP transport
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> MessagingResult<TransportResponse> {
        let method = match request.method {
            TransportMethod::Get => reqwest::Method::GET,
            TransportMethod::Post => reqwest::Method::POST,
            TransportMethod::Put => reqwest::Method::PUT,
            TransportMethod::Delete => reqwest::Method::DELETE,
        };

        debug!("Making {} request to: {}", request.method, request.url);

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(url = %request.url, error = %e, "Transport request failed");
            MessagingError::transport(&request.url, e.to_string())
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(TransportResponse { status, body })
    }

    fn description(&self) -> &'static str {
        "HTTP transport (reqwest)"
    }
}

/// Transport for deployments with no backend: every call fails with a
/// transport error, which the broker records like any other failure
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

#[async_trait]
impl Transport for OfflineTransport {
    async fn send(&self, request: TransportRequest) -> MessagingResult<TransportResponse> {
        Err(MessagingError::transport(request.url, "no backend transport configured"))
    }

    fn description(&self) -> &'static str {
        "Offline transport"
    }
}
