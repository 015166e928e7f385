//! Deferred, cancellable replies arbitrated between peer responders.
//!
//! Each responder ranks itself for an event and waits `delay_for_slot(slot)`
//! before replying. When any responder's reply for the same event shows up in
//! the channel first, the local reply is dropped.
//!
//! Per fingerprint the arbiter moves `Unarmed -> Armed -> Resolved`, and
//! `Resolved` is terminal. Every transition is a single operation on the
//! pending map performed under its lock, so a timer firing and an observed
//! competing reply can never both win: whichever claims the entry first
//! decides the outcome and the other sees `Resolved`.
//!
//! Announcements for events this process never scheduled still leave a
//! `Resolved` marker so a late local witness does not repeat them. Those
//! markers are capped at [`MAX_UNSCHEDULED_RESOLUTIONS`], oldest first.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::chat::ChatChannel;
use crate::fingerprint::EventFingerprint;
use crate::origin_tracker::OriginTracker;
use crate::peer_ranker::{own_slot, ResponderNaming};
use crate::reply_template::{ReplyTemplate, UNKNOWN_ORIGIN_USER};
use crate::slot_delay::SlotDelay;

/// Resolved markers kept for events that were never scheduled locally.
pub const MAX_UNSCHEDULED_RESOLUTIONS: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `ReplyState` values.
pub enum ReplyState {
    Armed,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of [`ReplyArbiter::schedule_reply`].
pub enum ScheduleOutcome {
    /// A deferred reply was armed for this event.
    Armed { slot: usize, delay: Duration },
    /// The event already had an entry; nothing changed.
    AlreadyTracked(ReplyState),
}

#[derive(Debug)]
enum PendingReply {
    Armed(AbortHandle),
    Resolved,
}

impl PendingReply {
    fn state(&self) -> ReplyState {
        match self {
            Self::Armed(_) => ReplyState::Armed,
            Self::Resolved => ReplyState::Resolved,
        }
    }
}

#[derive(Debug, Default)]
struct PendingReplies {
    entries: HashMap<EventFingerprint, PendingReply>,
    /// Insertion order of markers created by `resolve` without a prior entry.
    unscheduled: VecDeque<EventFingerprint>,
}

impl PendingReplies {
    fn record_unscheduled(&mut self, fingerprint: EventFingerprint) {
        self.unscheduled.push_back(fingerprint);
        while self.unscheduled.len() > MAX_UNSCHEDULED_RESOLUTIONS {
            let Some(oldest) = self.unscheduled.pop_front() else {
                break;
            };
            if matches!(self.entries.get(&oldest), Some(PendingReply::Resolved)) {
                self.entries.remove(&oldest);
            }
        }
    }
}

struct ArbiterShared {
    template: ReplyTemplate,
    channel: Arc<dyn ChatChannel>,
    origins: Arc<OriginTracker>,
    naming: ResponderNaming,
    delay: SlotDelay,
    pending: Mutex<PendingReplies>,
}

impl ArbiterShared {
    fn pending(&self) -> MutexGuard<'_, PendingReplies> {
        // Entries are replaced whole, so a panic elsewhere cannot leave one half-written.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims an armed entry for sending. Returns false when it was resolved first.
    fn claim_for_send(&self, fingerprint: &EventFingerprint) -> bool {
        let mut pending = self.pending();
        match pending.entries.get_mut(fingerprint) {
            Some(entry) if matches!(entry, PendingReply::Armed(_)) => {
                *entry = PendingReply::Resolved;
                true
            }
            _ => false,
        }
    }

    async fn fire(&self, fingerprint: EventFingerprint) {
        if !self.claim_for_send(&fingerprint) {
            tracing::debug!(
                reply = self.template.kind().as_str(),
                event_id = %fingerprint,
                "reply timer elapsed after resolution; skipping"
            );
            return;
        }

        let origin_user = self
            .origins
            .origin_user(&fingerprint)
            .unwrap_or_else(|| UNKNOWN_ORIGIN_USER.to_string());
        let text = self.template.render(&fingerprint, &origin_user);
        tracing::info!(
            reply = self.template.kind().as_str(),
            event_id = %fingerprint,
            "reply timer elapsed; replying"
        );
        if let Err(error) = self.channel.send_message(&text).await {
            tracing::warn!(
                reply = self.template.kind().as_str(),
                event_id = %fingerprint,
                %error,
                "failed to send reply"
            );
        }
    }
}

/// Arbitrates one reply kind for one channel.
///
/// Cloning is cheap and clones share the same pending replies. Separate
/// arbiters (for example witnessing and validated) never share state.
#[derive(Clone)]
pub struct ReplyArbiter {
    shared: Arc<ArbiterShared>,
}

impl ReplyArbiter {
    pub fn new(
        template: ReplyTemplate,
        channel: Arc<dyn ChatChannel>,
        origins: Arc<OriginTracker>,
        naming: ResponderNaming,
        delay: SlotDelay,
    ) -> Self {
        Self {
            shared: Arc::new(ArbiterShared {
                template,
                channel,
                origins,
                naming,
                delay,
                pending: Mutex::new(PendingReplies::default()),
            }),
        }
    }

    pub fn template(&self) -> &ReplyTemplate {
        &self.shared.template
    }

    /// Arms a deferred reply for `fingerprint` unless one is already tracked.
    ///
    /// The slot is computed from the live roster on every call. Must be
    /// called from within a Tokio runtime.
    pub fn schedule_reply(&self, fingerprint: EventFingerprint) -> ScheduleOutcome {
        if let Some(state) = self.state(&fingerprint) {
            return ScheduleOutcome::AlreadyTracked(state);
        }

        let roster = self.shared.channel.roster();
        let slot = own_slot(&fingerprint, &roster, &self.shared.naming);
        let delay = self.shared.delay.delay_for_slot(slot);

        let mut pending = self.shared.pending();
        match pending.entries.entry(fingerprint) {
            Entry::Occupied(entry) => ScheduleOutcome::AlreadyTracked(entry.get().state()),
            Entry::Vacant(entry) => {
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.fire(fingerprint).await;
                });
                entry.insert(PendingReply::Armed(handle.abort_handle()));
                tracing::info!(
                    reply = self.shared.template.kind().as_str(),
                    event_id = %fingerprint,
                    slot,
                    responders = roster.len(),
                    delay_ms = delay.as_millis() as u64,
                    "reply armed"
                );
                ScheduleOutcome::Armed { slot, delay }
            }
        }
    }

    /// Resolves the event announced by `text`, if it is a reply of this kind.
    ///
    /// An armed reply is cancelled. Repeating the same announcement is a no-op.
    pub fn observe_message(&self, text: &str) -> Option<EventFingerprint> {
        let fingerprint = self.shared.template.resolved_event(text)?;
        self.resolve(fingerprint);
        Some(fingerprint)
    }

    /// Marks `fingerprint` resolved, cancelling an armed reply.
    pub fn resolve(&self, fingerprint: EventFingerprint) {
        let mut pending = self.shared.pending();
        match pending.entries.insert(fingerprint, PendingReply::Resolved) {
            Some(PendingReply::Armed(handle)) => {
                handle.abort();
                tracing::info!(
                    reply = self.shared.template.kind().as_str(),
                    event_id = %fingerprint,
                    "reply already sent by a peer; cancelled"
                );
            }
            Some(PendingReply::Resolved) => {}
            None => pending.record_unscheduled(fingerprint),
        }
    }

    pub fn state(&self, fingerprint: &EventFingerprint) -> Option<ReplyState> {
        self.shared
            .pending()
            .entries
            .get(fingerprint)
            .map(PendingReply::state)
    }

    /// Number of events with an armed or resolved entry.
    pub fn tracked_count(&self) -> usize {
        self.shared.pending().entries.len()
    }

    pub fn armed_count(&self) -> usize {
        self.shared
            .pending()
            .entries
            .values()
            .filter(|entry| matches!(entry, PendingReply::Armed(_)))
            .count()
    }

    /// Cancels every armed reply; used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.shared.pending();
        let mut cancelled = 0;
        for entry in pending.entries.values_mut() {
            if let PendingReply::Armed(handle) = std::mem::replace(entry, PendingReply::Resolved) {
                handle.abort();
                cancelled += 1;
            }
        }
        cancelled
    }
}
