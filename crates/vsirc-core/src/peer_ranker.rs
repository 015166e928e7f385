//! Deterministic per-event ordering of the responders present in a channel.
//!
//! Every responder hashes the event fingerprint together with each peer's
//! display name and sorts by the result. Given the same roster snapshot, all
//! responders derive the same order without exchanging a single message.

use std::cmp::Ordering;

use sha2::{Digest, Sha256};

use crate::fingerprint::EventFingerprint;

/// Account-name prefix carried by every responder.
pub const DEFAULT_RESPONDER_PREFIX: &str = "vs-";

/// A chat participant as seen on the live channel roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub display_name: String,
    /// Transport account name; `None` until the transport has learned it.
    pub account_name: Option<String>,
    /// True for the entry describing this process.
    pub is_local: bool,
}

impl PeerIdentity {
    pub fn new(display_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            account_name: Some(account_name.into()),
            is_local: false,
        }
    }

    pub fn local(display_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            is_local: true,
            ..Self::new(display_name, account_name)
        }
    }
}

/// Naming convention that marks an account as a responder. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderNaming {
    prefix: String,
}

impl ResponderNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Account name this process registers under for `nickname`.
    pub fn account_name_for(&self, nickname: &str) -> String {
        format!("{}{}", self.prefix, nickname)
    }

    pub fn is_responder(&self, peer: &PeerIdentity) -> bool {
        peer.account_name
            .as_deref()
            .is_some_and(|account| account.starts_with(&self.prefix))
    }
}

impl Default for ResponderNaming {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONDER_PREFIX)
    }
}

/// Sort key of `display_name` for `fingerprint`: `SHA256(fingerprint ‖ UTF8(name))`.
pub fn peer_order_key(fingerprint: &EventFingerprint, display_name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(display_name.as_bytes());
    hasher.finalize().into()
}

/// Unsigned big-endian order: shorter keys first, then byte-by-byte.
pub fn compare_order_keys(left: &[u8], right: &[u8]) -> Ordering {
    left.len()
        .cmp(&right.len())
        .then_with(|| left.iter().cmp(right.iter()))
}

/// Responders from `roster` in their arbitration order for `fingerprint`.
///
/// Equal keys keep roster discovery order, so the result is a total order.
pub fn rank_responders<'a>(
    fingerprint: &EventFingerprint,
    roster: &'a [PeerIdentity],
    naming: &ResponderNaming,
) -> Vec<&'a PeerIdentity> {
    let mut keyed = roster
        .iter()
        .filter(|peer| naming.is_responder(peer))
        .map(|peer| (peer_order_key(fingerprint, &peer.display_name), peer))
        .collect::<Vec<_>>();
    keyed.sort_by(|(left, _), (right, _)| compare_order_keys(left, right));
    keyed.into_iter().map(|(_, peer)| peer).collect()
}

/// Number of responders strictly ahead of the local one.
///
/// When the local identity is not on the roster as a responder, every
/// responder counts as ahead of it.
pub fn own_slot(
    fingerprint: &EventFingerprint,
    roster: &[PeerIdentity],
    naming: &ResponderNaming,
) -> usize {
    rank_responders(fingerprint, roster, naming)
        .iter()
        .take_while(|peer| !peer.is_local)
        .count()
}
