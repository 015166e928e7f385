//! Boundary between the responder and the chat transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::peer_ranker::PeerIdentity;

#[derive(Debug, Error)]
/// Enumerates supported `ChatTransportError` values.
pub enum ChatTransportError {
    #[error("timed out connecting to chat server {server} after {timeout_ms}ms")]
    ConnectTimeout { server: String, timeout_ms: u64 },
    #[error("timed out joining channel {channel} after {timeout_ms}ms")]
    JoinTimeout { channel: String, timeout_ms: u64 },
    #[error("invalid chat server address '{0}'")]
    InvalidAddress(String),
    #[error("chat transport i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chat transport connection closed")]
    Closed,
}

/// Sender of an inbound chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub nickname: String,
    pub account_name: Option<String>,
}

/// One inbound `(sourceIdentity, targetChannel, text)` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub source: ChatUser,
    pub target: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(nickname: impl Into<String>, target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: ChatUser {
                nickname: nickname.into(),
                account_name: None,
            },
            target: target.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
/// Trait contract for a joined chat channel.
pub trait ChatChannel: Send + Sync {
    fn channel_name(&self) -> &str;

    /// Display name this process currently uses in the channel.
    fn local_nickname(&self) -> String;

    /// Snapshot of the participants currently present, local user included.
    fn roster(&self) -> Vec<PeerIdentity>;

    async fn send_message(&self, text: &str) -> Result<(), ChatTransportError>;
}
