//! Reply texts responders send, and the patterns that recognize them.

use std::sync::LazyLock;

use regex::Regex;

use crate::fingerprint::EventFingerprint;

/// Placeholder used when the origin of an event is not known locally.
pub const UNKNOWN_ORIGIN_USER: &str = "<unknown user>";

static WITNESSING_REPLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<nickname>[^!@: ]+): witnessing (?P<event_id>[A-Z0-9]+)\.\.\.$")
        .expect("WITNESSING_REPLY_RE regex should compile")
});

static VALIDATED_REPLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<nickname>[^!@: ]+|<unknown user>): (?P<event_id>[A-Z0-9]+) validated!$")
        .expect("VALIDATED_REPLY_RE regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `ReplyKind` values.
pub enum ReplyKind {
    /// Immediate acknowledgement of a witness command.
    Witnessing,
    /// Confirmation once the event source reports the event validated.
    Validated,
}

impl ReplyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Witnessing => "witnessing",
            Self::Validated => "validated",
        }
    }
}

/// One (reply pattern, reply format) pairing owned by a reply arbiter.
#[derive(Debug, Clone)]
pub struct ReplyTemplate {
    kind: ReplyKind,
    pattern: &'static Regex,
}

impl ReplyTemplate {
    pub fn witnessing() -> Self {
        Self {
            kind: ReplyKind::Witnessing,
            pattern: &WITNESSING_REPLY_RE,
        }
    }

    pub fn validated() -> Self {
        Self {
            kind: ReplyKind::Validated,
            pattern: &VALIDATED_REPLY_RE,
        }
    }

    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    pub fn render(&self, fingerprint: &EventFingerprint, origin_user: &str) -> String {
        match self.kind {
            ReplyKind::Witnessing => format!("{origin_user}: witnessing {}...", fingerprint.to_hex()),
            ReplyKind::Validated => format!("{origin_user}: {} validated!", fingerprint.to_hex()),
        }
    }

    /// Fingerprint announced by `text` when it is a reply of this kind.
    ///
    /// Lines whose event id is not a well-formed fingerprint are not replies.
    pub fn resolved_event(&self, text: &str) -> Option<EventFingerprint> {
        let captures = self.pattern.captures(text)?;
        let event_id = captures.name("event_id")?.as_str();
        EventFingerprint::from_hex(event_id).ok()
    }
}
