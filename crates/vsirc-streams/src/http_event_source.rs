//! Non-standard HTTP/NDJSON adapter for the `Streams` operations.
//!
//! Nodes serve gRPC (see [`crate::GrpcEventSource`]). This adapter is for
//! HTTP gateways exposing `POST /v1/events/witness` and an NDJSON
//! `GET /v1/events/validated` feed with uppercase-hex event ids.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use vsirc_core::{EventFingerprint, EventSource, EventSourceError, ValidatedBatchStream};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `HttpEventSourceConfig` used by responder startup.
pub struct HttpEventSourceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl HttpEventSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct WitnessEventRequest<'a> {
    event_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidatedEventsBatch {
    #[serde(default)]
    events: Vec<ValidatedEvent>,
}

#[derive(Debug, Deserialize)]
struct ValidatedEvent {
    event_id: String,
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated = body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn transport_error(error: reqwest::Error) -> EventSourceError {
    EventSourceError::Unavailable(error.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EventSourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EventSourceError::Status {
        status: status.as_u16(),
        body: truncate_for_error(&body),
    })
}

/// Splits a byte stream into NDJSON lines and decodes each as one batch.
#[derive(Debug, Default)]
pub struct NdjsonBatchDecoder {
    buffer: Vec<u8>,
}

type BatchResult = Result<Vec<EventFingerprint>, EventSourceError>;

impl NdjsonBatchDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<BatchResult> {
        self.buffer.extend_from_slice(chunk);
        let mut batches = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            if let Some(batch) = decode_batch_line(&line) {
                batches.push(batch);
            }
        }
        batches
    }

    /// Decodes a final unterminated line, if any.
    pub fn finish(&mut self) -> Option<BatchResult> {
        let line = std::mem::take(&mut self.buffer);
        decode_batch_line(&line)
    }
}

fn decode_batch_line(line: &[u8]) -> Option<BatchResult> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(error) => return Some(Err(EventSourceError::InvalidPayload(error.to_string()))),
    };
    if text.is_empty() {
        return None;
    }
    let batch = match serde_json::from_str::<ValidatedEventsBatch>(text) {
        Ok(batch) => batch,
        Err(error) => return Some(Err(EventSourceError::InvalidPayload(error.to_string()))),
    };
    Some(
        batch
            .events
            .iter()
            .map(|event| EventFingerprint::from_hex(&event.event_id).map_err(EventSourceError::from))
            .collect(),
    )
}

/// `Streams` operations over the HTTP/NDJSON gateway protocol.
#[derive(Clone)]
pub struct HttpEventSource {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpEventSource {
    pub fn new(config: HttpEventSourceConfig) -> Result<Self, EventSourceError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("vsirc-bot"),
        );
        // No client-wide timeout: it would also cut the long-lived subscription.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout.max(Duration::from_millis(1)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn submit_event(&self, fingerprint: EventFingerprint) -> Result<(), EventSourceError> {
        let event_id = fingerprint.to_hex();
        let response = self
            .http
            .post(format!("{}/v1/events/witness", self.base_url))
            .timeout(self.request_timeout)
            .json(&WitnessEventRequest {
                event_id: &event_id,
            })
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn subscribe_validated(
        &self,
        from_latest: bool,
    ) -> Result<ValidatedBatchStream, EventSourceError> {
        let response = self
            .http
            .get(format!("{}/v1/events/validated", self.base_url))
            .query(&[("from_latest", from_latest)])
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let body = Box::pin(response.bytes_stream());
        let state = (body, NdjsonBatchDecoder::default(), VecDeque::new(), false);
        let batches = futures_util::stream::unfold(
            state,
            |(mut body, mut decoder, mut ready, mut finished)| async move {
                loop {
                    if let Some(item) = ready.pop_front() {
                        return Some((item, (body, decoder, ready, finished)));
                    }
                    if finished {
                        return None;
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => ready.extend(decoder.push(&chunk)),
                        Some(Err(error)) => {
                            finished = true;
                            ready.push_back(Err(transport_error(error)));
                        }
                        None => {
                            finished = true;
                            ready.extend(decoder.finish());
                            ready.push_back(Err(EventSourceError::StreamClosed));
                        }
                    }
                }
            },
        );
        Ok(batches.boxed())
    }
}
