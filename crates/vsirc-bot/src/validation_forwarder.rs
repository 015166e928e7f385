//! Supervised subscription to validated events.
//!
//! Every confirmed fingerprint arms a validated reply. Transient failures
//! reconnect with a linear backoff that resets once a batch arrives.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vsirc_core::{EventSource, EventSourceError, ReplyArbiter};

pub struct ValidationForwarder {
    event_source: Arc<dyn EventSource>,
    validated: ReplyArbiter,
    retry_base_delay: Duration,
}

fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.max(1))
}

impl ValidationForwarder {
    pub fn new(
        event_source: Arc<dyn EventSource>,
        validated: ReplyArbiter,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            event_source,
            validated,
            retry_base_delay,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), EventSourceError>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Forwards until `shutdown` flips or a non-retryable error ends the
    /// subscription.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), EventSourceError> {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let failure = tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                failure = self.forward_subscription(&mut attempt) => failure,
            };
            if !failure.retryable() {
                tracing::error!(error = %failure, "validated-event subscription failed");
                return Err(failure);
            }

            attempt = attempt.saturating_add(1);
            let delay = retry_delay(self.retry_base_delay, attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "validated-event subscription interrupted; reconnecting"
            );
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs one subscription to completion and returns why it ended.
    async fn forward_subscription(&self, attempt: &mut u32) -> EventSourceError {
        let mut batches = match self.event_source.subscribe_validated(true).await {
            Ok(batches) => batches,
            Err(error) => return error,
        };
        tracing::info!("subscribed to validated events");

        while let Some(batch) = batches.next().await {
            match batch {
                Ok(fingerprints) => {
                    *attempt = 0;
                    for fingerprint in fingerprints {
                        tracing::info!(event_id = %fingerprint, "event validated");
                        self.validated.schedule_reply(fingerprint);
                    }
                }
                Err(error) if error.retryable() => return error,
                Err(error) => {
                    tracing::warn!(%error, "skipping malformed validated-event batch");
                }
            }
        }
        EventSourceError::StreamClosed
    }
}
