//! # Messaging Error Types
//!
//! Structured errors for broker sends and the transport collaborators behind them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Transport failure calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Backend returned HTTP {status} for {url}: {body}")]
    HttpStatus { url: String, status: u16, body: String },

    #[error("Invalid transport request: {message}")]
    InvalidRequest { message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },
}

impl MessagingError {
    /// Create a transport failure error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a non-success status error
    pub fn http_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::MessageSerialization {
            message: err.to_string(),
        }
    }
}

/// Conversion from reqwest::Error to MessagingError
impl From<reqwest::Error> for MessagingError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_builder() {
            Self::invalid_request(err.to_string())
        } else {
            Self::transport(url, err.to_string())
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
