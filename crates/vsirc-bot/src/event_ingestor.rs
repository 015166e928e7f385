//! Chat commands that create events: `!w[itness] <data>` and `help`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use vsirc_core::{ChatChannel, ChatMessage, EventFingerprint, EventSource, OriginTracker, ReplyArbiter};

static WITNESS_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^!w(?:itness)? (?P<data>.+)$").expect("witness command regex should compile")
});

static HELP_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<nickname>[^!@: ]+).+ help.*$").expect("help command regex should compile")
});

/// Returns the payload of a `!w <data>` / `!witness <data>` command.
pub fn parse_witness_command(text: &str) -> Option<&str> {
    WITNESS_COMMAND_RE
        .captures(text)
        .and_then(|captures| captures.name("data"))
        .map(|data| data.as_str())
}

/// Returns the nickname a `<nick>: ... help` line is addressed to.
pub fn parse_help_addressee(text: &str) -> Option<&str> {
    HELP_COMMAND_RE
        .captures(text)
        .and_then(|captures| captures.name("nickname"))
        .map(|nickname| nickname.as_str())
}

pub fn help_text(user: &str) -> String {
    format!("{user}: !w[itness] <data> -- create and witness a validated-streams event")
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `IngestOutcome` values.
pub enum IngestOutcome {
    Witnessed(EventFingerprint),
    HelpSent,
}

/// Handles inbound commands for one channel.
pub struct EventIngestor {
    channel: Arc<dyn ChatChannel>,
    event_source: Arc<dyn EventSource>,
    origins: Arc<OriginTracker>,
    witnessing: ReplyArbiter,
}

impl EventIngestor {
    pub fn new(
        channel: Arc<dyn ChatChannel>,
        event_source: Arc<dyn EventSource>,
        origins: Arc<OriginTracker>,
        witnessing: ReplyArbiter,
    ) -> Self {
        Self {
            channel,
            event_source,
            origins,
            witnessing,
        }
    }

    /// Acts on `message` if it is a command; other text is ignored.
    ///
    /// A witness command submits the event without waiting for the event
    /// source, records who asked for it and arms the witnessing reply.
    pub async fn handle_message(&self, message: &ChatMessage) -> Option<IngestOutcome> {
        let user = message.source.nickname.as_str();

        if let Some(payload) = parse_witness_command(&message.text) {
            let fingerprint = EventFingerprint::for_submission(user, payload);
            tracing::info!(event_id = %fingerprint, user, "witness requested");

            let event_source = Arc::clone(&self.event_source);
            tokio::spawn(async move {
                if let Err(error) = event_source.submit_event(fingerprint).await {
                    tracing::warn!(event_id = %fingerprint, %error, "failed to submit witnessed event");
                }
            });

            self.origins.record_origin(fingerprint, user);
            self.witnessing.schedule_reply(fingerprint);
            return Some(IngestOutcome::Witnessed(fingerprint));
        }

        let addressee = parse_help_addressee(&message.text)?;
        if addressee != self.channel.local_nickname() {
            return None;
        }
        if let Err(error) = self.channel.send_message(&help_text(user)).await {
            tracing::warn!(%error, user, "failed to send help text");
        }
        Some(IngestOutcome::HelpSent)
    }
}
