//! gRPC client for the `validated_streams.Streams` service exposed by
//! validated-streams nodes.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use vsirc_core::{EventFingerprint, EventSource, EventSourceError, ValidatedBatchStream};

/// Messages and stubs generated from `proto/streams.proto`.
pub mod proto {
    tonic::include_proto!("validated_streams");
}

use proto::streams_client::StreamsClient;
use proto::{ValidatedEventsRequest, ValidatedEventsResponse, WitnessEventRequest};

/// Port a validated-streams node serves `Streams` on by default.
pub const DEFAULT_GRPC_PORT: u16 = 5555;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcEventSourceConfig {
    /// `http://host:port`. A bare `host[:port]` is dialed as plaintext HTTP/2.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl GrpcEventSourceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else if trimmed.contains(':') {
        format!("http://{trimmed}")
    } else {
        format!("http://{trimmed}:{DEFAULT_GRPC_PORT}")
    }
}

/// Maps a call failure onto the responder's error model.
///
/// Only transport-level codes are retryable; anything the node decided
/// (for example `Aborted` on a failed witness) is reported as is.
pub fn status_error(status: Status) -> EventSourceError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded => {
            EventSourceError::Unavailable(status.message().to_string())
        }
        code => EventSourceError::Rpc {
            code: format!("{code:?}"),
            message: status.message().to_string(),
        },
    }
}

fn batch_fingerprints(response: ValidatedEventsResponse) -> Vec<EventFingerprint> {
    let next_block = response.next_block;
    response
        .events
        .into_iter()
        .filter_map(|event| match EventFingerprint::from_slice(&event.event_id) {
            Ok(fingerprint) => Some(fingerprint),
            Err(error) => {
                tracing::warn!(%error, next_block, "skipping malformed validated event id");
                None
            }
        })
        .collect()
}

/// `Streams` client over a lazily connected tonic channel.
#[derive(Clone)]
pub struct GrpcEventSource {
    client: StreamsClient<Channel>,
    endpoint: String,
    request_timeout: Duration,
}

impl GrpcEventSource {
    /// Builds the client without dialing; the first call connects.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GrpcEventSourceConfig) -> Result<Self, EventSourceError> {
        let endpoint = normalize_endpoint(&config.endpoint);
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|error| {
                EventSourceError::Unavailable(format!("invalid endpoint '{endpoint}': {error}"))
            })?
            .connect_timeout(config.connect_timeout.max(Duration::from_millis(1)))
            .connect_lazy();
        Ok(Self {
            client: StreamsClient::new(channel),
            endpoint,
            request_timeout: config.request_timeout.max(Duration::from_millis(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSource for GrpcEventSource {
    async fn submit_event(&self, fingerprint: EventFingerprint) -> Result<(), EventSourceError> {
        let mut request = tonic::Request::new(WitnessEventRequest {
            event_id: fingerprint.as_bytes().to_vec(),
        });
        request.set_timeout(self.request_timeout);
        let mut client = self.client.clone();
        match tokio::time::timeout(self.request_timeout, client.witness_event(request)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) => Err(status_error(status)),
            Err(_) => Err(EventSourceError::Unavailable(format!(
                "witness call timed out after {}ms",
                self.request_timeout.as_millis()
            ))),
        }
    }

    async fn subscribe_validated(
        &self,
        from_latest: bool,
    ) -> Result<ValidatedBatchStream, EventSourceError> {
        let request = ValidatedEventsRequest {
            from_block: 0,
            from_latest,
        };
        let mut client = self.client.clone();
        let responses = client
            .validated_events(request)
            .await
            .map_err(status_error)?
            .into_inner();
        tracing::debug!(
            endpoint = %self.endpoint,
            from_latest,
            "validated-events subscription opened"
        );

        let batches = responses
            .map(|item| item.map(batch_fingerprints).map_err(status_error))
            .chain(futures_util::stream::once(async {
                Err(EventSourceError::StreamClosed)
            }));
        Ok(batches.boxed())
    }
}
