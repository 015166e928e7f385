//! Maps event fingerprints to the chat user who submitted them.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::fingerprint::EventFingerprint;

/// Records which user caused each witnessed event.
///
/// Entries are written once at ingestion and only read afterwards. Nothing
/// is evicted for the lifetime of the process.
#[derive(Debug, Default)]
pub struct OriginTracker {
    users: RwLock<HashMap<EventFingerprint, String>>,
}

impl OriginTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_origin(&self, fingerprint: EventFingerprint, user: impl Into<String>) {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        users.insert(fingerprint, user.into());
    }

    pub fn origin_user(&self, fingerprint: &EventFingerprint) -> Option<String> {
        let users = self
            .users
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        users.get(fingerprint).cloned()
    }

    pub fn len(&self) -> usize {
        self.users
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
