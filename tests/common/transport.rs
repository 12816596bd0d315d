use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tome_core::messaging::{MessagingResult, Transport, TransportRequest, TransportResponse};

/// Transport double that records every request and answers with a fixed response
#[derive(Debug)]
pub struct RecordingTransport {
    status: u16,
    body: Value,
    requests: Mutex<Vec<TransportRequest>>,
}

impl RecordingTransport {
    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> MessagingResult<TransportResponse> {
        self.requests.lock().push(request);
        Ok(TransportResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }

    fn description(&self) -> &'static str {
        "recording test transport"
    }
}
