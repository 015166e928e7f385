//! Per-channel composition of the arbiters, the ingestor and the
//! validated-event forwarder.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use vsirc_core::{
    ChatChannel, ChatMessage, EventSource, OriginTracker, ReplyArbiter, ReplyTemplate,
    ResponderNaming, SlotDelay,
};

use crate::event_ingestor::EventIngestor;
use crate::validation_forwarder::ValidationForwarder;

pub struct Bot {
    channel: Arc<dyn ChatChannel>,
    event_source: Arc<dyn EventSource>,
    origins: Arc<OriginTracker>,
    witnessing: ReplyArbiter,
    validated: ReplyArbiter,
    ingestor: EventIngestor,
}

impl Bot {
    pub fn new(
        channel: Arc<dyn ChatChannel>,
        event_source: Arc<dyn EventSource>,
        origins: Arc<OriginTracker>,
        naming: ResponderNaming,
        delay: SlotDelay,
    ) -> Self {
        let witnessing = ReplyArbiter::new(
            ReplyTemplate::witnessing(),
            Arc::clone(&channel),
            Arc::clone(&origins),
            naming.clone(),
            delay,
        );
        let validated = ReplyArbiter::new(
            ReplyTemplate::validated(),
            Arc::clone(&channel),
            Arc::clone(&origins),
            naming,
            delay,
        );
        let ingestor = EventIngestor::new(
            Arc::clone(&channel),
            Arc::clone(&event_source),
            Arc::clone(&origins),
            witnessing.clone(),
        );
        Self {
            channel,
            event_source,
            origins,
            witnessing,
            validated,
            ingestor,
        }
    }

    pub fn witnessing(&self) -> &ReplyArbiter {
        &self.witnessing
    }

    pub fn validated(&self) -> &ReplyArbiter {
        &self.validated
    }

    pub fn origins(&self) -> &OriginTracker {
        &self.origins
    }

    pub fn validation_forwarder(&self, retry_base_delay: Duration) -> ValidationForwarder {
        ValidationForwarder::new(
            Arc::clone(&self.event_source),
            self.validated.clone(),
            retry_base_delay,
        )
    }

    /// Routes one inbound line. Peer replies resolve pending replies before
    /// the line is considered as a command.
    pub async fn dispatch(&self, message: &ChatMessage) {
        if !message.target.eq_ignore_ascii_case(self.channel.channel_name()) {
            return;
        }
        self.witnessing.observe_message(&message.text);
        self.validated.observe_message(&message.text);
        self.ingestor.handle_message(message).await;
    }

    /// Dispatches inbound lines until `shutdown` flips or the chat
    /// connection closes. Armed replies are cancelled either way.
    pub async fn run(
        &self,
        mut messages: mpsc::UnboundedReceiver<ChatMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let connection_closed = loop {
            if *shutdown.borrow() {
                break false;
            }
            tokio::select! {
                _ = shutdown.changed() => break false,
                message = messages.recv() => match message {
                    Some(message) => self.dispatch(&message).await,
                    None => break true,
                },
            }
        };
        self.shutdown();
        if connection_closed {
            bail!("chat connection closed");
        }
        Ok(())
    }

    /// Cancels every armed reply of both kinds.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.witnessing.cancel_all() + self.validated.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "cancelled pending replies");
        }
        cancelled
    }
}
