//! Boundary between the responder and the validated-streams event source.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::fingerprint::{EventFingerprint, FingerprintError};

/// Server-streamed batches of confirmed event fingerprints.
pub type ValidatedBatchStream =
    BoxStream<'static, Result<Vec<EventFingerprint>, EventSourceError>>;

#[derive(Debug, Error)]
/// Enumerates supported `EventSourceError` values.
pub enum EventSourceError {
    #[error("event source unavailable: {0}")]
    Unavailable(String),
    #[error("event source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("event source rejected the call ({code}): {message}")]
    Rpc { code: String, message: String },
    #[error("event source stream closed")]
    StreamClosed,
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

impl EventSourceError {
    /// True for transient transport failures worth reconnecting after.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::StreamClosed => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Rpc { .. } | Self::InvalidPayload(_) | Self::Fingerprint(_) => false,
        }
    }
}

#[async_trait]
/// Trait contract for the `Streams` service used by responders.
pub trait EventSource: Send + Sync {
    async fn submit_event(&self, fingerprint: EventFingerprint) -> Result<(), EventSourceError>;

    async fn subscribe_validated(
        &self,
        from_latest: bool,
    ) -> Result<ValidatedBatchStream, EventSourceError>;
}
