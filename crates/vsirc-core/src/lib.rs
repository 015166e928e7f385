//! Peer coordination primitives for validated-streams chat responders.
//!
//! Several responders share one chat channel and one event stream. This crate
//! holds the pieces that let them agree, without talking to each other, on
//! which one acknowledges a given event: event fingerprints, the per-event
//! peer ordering, the slot delay curve and the reply arbiter that arms and
//! cancels deferred replies. Transport concerns live behind the
//! [`ChatChannel`] and [`EventSource`] traits.

pub mod chat;
pub mod event_source;
pub mod fingerprint;
pub mod origin_tracker;
pub mod peer_ranker;
pub mod reply_arbiter;
pub mod reply_template;
pub mod slot_delay;

pub use chat::{ChatChannel, ChatMessage, ChatTransportError, ChatUser};
pub use event_source::{EventSource, EventSourceError, ValidatedBatchStream};
pub use fingerprint::{EventFingerprint, FingerprintError, FINGERPRINT_LEN};
pub use origin_tracker::OriginTracker;
pub use peer_ranker::{
    compare_order_keys, own_slot, peer_order_key, rank_responders, PeerIdentity, ResponderNaming,
    DEFAULT_RESPONDER_PREFIX,
};
pub use reply_arbiter::{
    ReplyArbiter, ReplyState, ScheduleOutcome, MAX_UNSCHEDULED_RESOLUTIONS,
};
pub use reply_template::{ReplyKind, ReplyTemplate, UNKNOWN_ORIGIN_USER};
pub use slot_delay::SlotDelay;
