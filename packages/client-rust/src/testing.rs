//! Recording transport shared by the unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub(crate) struct MockTransport {
    responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        let status = StatusCode::from_u16(status).unwrap();
        self.responses
            .lock()
            .push_back(Ok(ApiResponse::new(status, body)));
    }

    pub(crate) fn push_error(&self, err: TransportError) {
        self.responses.lock().push_back(Err(err));
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no response queued".into())))
    }
}

/// Encodes `claims` as an HS256 token.
pub(crate) fn token(claims: &Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test"),
    )
    .unwrap()
}
