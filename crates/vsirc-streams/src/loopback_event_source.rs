//! In-process event source that confirms every submitted event.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use vsirc_core::{EventFingerprint, EventSource, EventSourceError, ValidatedBatchStream};

type BatchSender = mpsc::UnboundedSender<Result<Vec<EventFingerprint>, EventSourceError>>;

/// Echoes each submission back to all subscribers as a one-event batch.
#[derive(Debug, Default)]
pub struct LoopbackEventSource {
    subscribers: Mutex<Vec<BatchSender>>,
    submitted: Mutex<Vec<EventFingerprint>>,
}

impl LoopbackEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<BatchSender>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delivers `batch` to every live subscriber.
    pub fn confirm(&self, batch: Vec<EventFingerprint>) {
        self.subscribers()
            .retain(|subscriber| subscriber.send(Ok(batch.clone())).is_ok());
    }

    /// Ends every open subscription stream.
    pub fn disconnect_all(&self) {
        self.subscribers().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers()
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }

    pub fn submitted(&self) -> Vec<EventFingerprint> {
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventSource for LoopbackEventSource {
    async fn submit_event(&self, fingerprint: EventFingerprint) -> Result<(), EventSourceError> {
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(fingerprint);
        self.confirm(vec![fingerprint]);
        Ok(())
    }

    async fn subscribe_validated(
        &self,
        _from_latest: bool,
    ) -> Result<ValidatedBatchStream, EventSourceError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers().push(sender);
        Ok(UnboundedReceiverStream::new(receiver).boxed())
    }
}
