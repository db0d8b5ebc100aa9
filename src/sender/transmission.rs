use super::client::{ClickHouseClient, ClientError};
use super::pool::BatchSink;
use super::serialization::BatchSerializer;
use crate::buffer::Batch;
use reqwest::StatusCode;
use std::time::Instant;
use tracing::{debug, warn};

/// How a single delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    /// 429 or 503: the server asked us to slow down.
    RateLimited,
    /// Other 5xx, timeouts and connection failures.
    Transient(String),
    /// Anything else; retrying cannot help.
    Permanent(String),
}

impl SendOutcome {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status.is_success() {
            SendOutcome::Success
        } else if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            SendOutcome::RateLimited
        } else if status.is_server_error() {
            SendOutcome::Transient(describe(status, body))
        } else {
            SendOutcome::Permanent(describe(status, body))
        }
    }

    pub fn from_error(err: &ClientError) -> Self {
        match err {
            ClientError::RequestTimeout(_) | ClientError::ConnectionFailed(_) => {
                SendOutcome::Transient(err.to_string())
            }
            ClientError::NetworkError(e) if e.is_request() || e.is_body() => {
                SendOutcome::Transient(err.to_string())
            }
            _ => SendOutcome::Permanent(err.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SendOutcome::RateLimited | SendOutcome::Transient(_))
    }
}

fn describe(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        // ClickHouse exceptions can be long
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status}: {snippet}")
    }
}

/// Serializes batches and inserts them into ClickHouse.
#[derive(Debug, Clone)]
pub struct BatchTransmitter {
    client: ClickHouseClient,
    serializer: BatchSerializer,
}

impl BatchTransmitter {
    pub fn new(client: ClickHouseClient) -> Self {
        Self {
            client,
            serializer: BatchSerializer::new(),
        }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    pub async fn send_batch(&self, batch: &Batch) -> SendOutcome {
        let start = Instant::now();
        let compress = self.client.config().compress;

        let payload = if compress {
            self.serializer.serialize_compressed(batch)
        } else {
            self.serializer.serialize_ndjson(batch)
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => return SendOutcome::Permanent(format!("Serialization failed: {e}")),
        };
        let bytes = payload.len();

        let outcome = match self.client.insert(payload, compress).await {
            Ok(response) => SendOutcome::from_status(response.status, &response.body),
            Err(e) => SendOutcome::from_error(&e),
        };

        match &outcome {
            SendOutcome::Success => debug!(
                batch_id = %batch.id(),
                events = batch.size(),
                bytes,
                latency_ms = start.elapsed().as_millis() as u64,
                "Batch inserted"
            ),
            other => warn!(batch_id = %batch.id(), outcome = ?other, "Batch insert failed"),
        }
        outcome
    }
}

impl BatchSink for BatchTransmitter {
    async fn send(&self, batch: &Batch) -> SendOutcome {
        self.send_batch(batch).await
    }
}
