use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use vsirc_core::{
    ChatChannel, ChatTransportError, EventFingerprint, EventSource, EventSourceError,
    OriginTracker, PeerIdentity, ResponderNaming, SlotDelay, ValidatedBatchStream,
};

use crate::bot::Bot;

pub(crate) const CHANNEL: &str = "#validated";
pub(crate) const LOCAL_NICK: &str = "bot0";

pub(crate) struct FakeChannel {
    local_nickname: String,
    roster: Mutex<Vec<PeerIdentity>>,
    sent: Mutex<Vec<String>>,
}

impl FakeChannel {
    /// A channel where the local responder is alone.
    pub(crate) fn solo() -> Arc<Self> {
        Arc::new(Self {
            local_nickname: LOCAL_NICK.to_string(),
            roster: Mutex::new(vec![PeerIdentity::local(LOCAL_NICK, "vs-bot0")]),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// The local responder plus `peers` other responders.
    pub(crate) fn with_peers(peers: usize) -> Arc<Self> {
        let mut roster = vec![PeerIdentity::local(LOCAL_NICK, "vs-bot0")];
        for index in 1..=peers {
            roster.push(PeerIdentity::new(format!("bot{index}"), format!("vs-bot{index}")));
        }
        Arc::new(Self {
            local_nickname: LOCAL_NICK.to_string(),
            roster: Mutex::new(roster),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ChatChannel for FakeChannel {
    fn channel_name(&self) -> &str {
        CHANNEL
    }

    fn local_nickname(&self) -> String {
        self.local_nickname.clone()
    }

    fn roster(&self) -> Vec<PeerIdentity> {
        self.roster.lock().expect("roster lock").clone()
    }

    async fn send_message(&self, text: &str) -> Result<(), ChatTransportError> {
        self.sent.lock().expect("sent lock").push(text.to_string());
        Ok(())
    }
}

pub(crate) type ScriptedSubscription =
    Result<Vec<Result<Vec<EventFingerprint>, EventSourceError>>, EventSourceError>;

/// Event source whose subscriptions replay a script, then stay open forever.
#[derive(Default)]
pub(crate) struct ScriptedEventSource {
    submitted: Mutex<Vec<EventFingerprint>>,
    subscriptions: Mutex<VecDeque<ScriptedSubscription>>,
    subscribe_calls: AtomicUsize,
}

impl ScriptedEventSource {
    pub(crate) fn new(subscriptions: Vec<ScriptedSubscription>) -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(subscriptions.into()),
            ..Self::default()
        })
    }

    pub(crate) fn submitted(&self) -> Vec<EventFingerprint> {
        self.submitted.lock().expect("submitted lock").clone()
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn submit_event(&self, fingerprint: EventFingerprint) -> Result<(), EventSourceError> {
        self.submitted
            .lock()
            .expect("submitted lock")
            .push(fingerprint);
        Ok(())
    }

    async fn subscribe_validated(
        &self,
        _from_latest: bool,
    ) -> Result<ValidatedBatchStream, EventSourceError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .subscriptions
            .lock()
            .expect("subscriptions lock")
            .pop_front();
        match next {
            Some(Ok(items)) => Ok(futures_util::stream::iter(items).boxed()),
            Some(Err(error)) => Err(error),
            None => Ok(futures_util::stream::pending().boxed()),
        }
    }
}

pub(crate) fn bot_with(channel: Arc<FakeChannel>, event_source: Arc<ScriptedEventSource>) -> Bot {
    Bot::new(
        channel,
        event_source,
        Arc::new(OriginTracker::new()),
        ResponderNaming::default(),
        SlotDelay::new(Duration::from_secs(1)),
    )
}
