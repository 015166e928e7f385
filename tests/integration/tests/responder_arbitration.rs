use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use vsirc_bot::Bot;
use vsirc_core::{
    rank_responders, ChatChannel, ChatMessage, ChatTransportError, EventFingerprint, OriginTracker,
    PeerIdentity, ResponderNaming, SlotDelay,
};
use vsirc_streams::LoopbackEventSource;

const CHANNEL: &str = "#validated-streams";
const RESPONDERS: [&str; 3] = ["bot-a", "bot-b", "bot-c"];

#[derive(Debug, Clone)]
struct SentLine {
    sender: String,
    text: String,
    at: Duration,
}

struct Member {
    nickname: String,
    account_name: String,
    inbound: mpsc::UnboundedSender<ChatMessage>,
}

/// In-memory channel shared by every responder. Lines are relayed to every
/// other member, as an IRC server would, unless the bus is partitioned.
struct ChannelBus {
    started: Instant,
    partitioned: bool,
    members: Mutex<Vec<Member>>,
    transcript: Mutex<Vec<SentLine>>,
}

impl ChannelBus {
    fn new(partitioned: bool) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            partitioned,
            members: Mutex::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
        })
    }

    fn join(
        self: &Arc<Self>,
        nickname: &str,
        account_name: &str,
    ) -> (BusChannel, mpsc::UnboundedReceiver<ChatMessage>) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        self.members.lock().expect("members lock").push(Member {
            nickname: nickname.to_string(),
            account_name: account_name.to_string(),
            inbound,
        });
        let channel = BusChannel {
            bus: Arc::clone(self),
            nickname: nickname.to_string(),
        };
        (channel, receiver)
    }

    /// Delivers a line from `sender` to every other member.
    fn relay(&self, sender: &str, text: &str) {
        for member in self.members.lock().expect("members lock").iter() {
            if member.nickname != sender {
                let _ = member
                    .inbound
                    .send(ChatMessage::new(sender, CHANNEL, text));
            }
        }
    }

    fn roster_for(&self, local: &str) -> Vec<PeerIdentity> {
        self.members
            .lock()
            .expect("members lock")
            .iter()
            .map(|member| {
                if member.nickname == local {
                    PeerIdentity::local(member.nickname.clone(), member.account_name.clone())
                } else {
                    PeerIdentity::new(member.nickname.clone(), member.account_name.clone())
                }
            })
            .collect()
    }

    fn transcript(&self) -> Vec<SentLine> {
        self.transcript.lock().expect("transcript lock").clone()
    }
}

struct BusChannel {
    bus: Arc<ChannelBus>,
    nickname: String,
}

#[async_trait]
impl ChatChannel for BusChannel {
    fn channel_name(&self) -> &str {
        CHANNEL
    }

    fn local_nickname(&self) -> String {
        self.nickname.clone()
    }

    fn roster(&self) -> Vec<PeerIdentity> {
        self.bus.roster_for(&self.nickname)
    }

    async fn send_message(&self, text: &str) -> Result<(), ChatTransportError> {
        self.bus
            .transcript
            .lock()
            .expect("transcript lock")
            .push(SentLine {
                sender: self.nickname.clone(),
                text: text.to_string(),
                at: self.bus.started.elapsed(),
            });
        if !self.bus.partitioned {
            self.bus.relay(&self.nickname, text);
        }
        Ok(())
    }
}

struct Swarm {
    bus: Arc<ChannelBus>,
    event_source: Arc<LoopbackEventSource>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Swarm {
    /// Starts one bot per responder name plus a human participant `alice`.
    async fn start(partitioned: bool) -> Self {
        let bus = ChannelBus::new(partitioned);
        let event_source = Arc::new(LoopbackEventSource::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // alice has no responder account and never ranks.
        let (_alice, _alice_inbox) = bus.join("alice", "alice");
        for nickname in RESPONDERS {
            let (channel, messages) = bus.join(nickname, &format!("vs-{nickname}"));
            let bot = Arc::new(Bot::new(
                Arc::new(channel),
                event_source.clone(),
                Arc::new(OriginTracker::new()),
                ResponderNaming::default(),
                SlotDelay::new(Duration::from_secs(1)),
            ));
            let forwarder = bot
                .validation_forwarder(Duration::from_millis(100))
                .spawn(shutdown_rx.clone());
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let _ = bot.run(messages, shutdown_rx).await;
                let _ = forwarder.await;
            }));
        }

        // Let every forwarder subscribe before anything is submitted.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(event_source.subscriber_count(), RESPONDERS.len());
        Self {
            bus,
            event_source,
            shutdown,
            tasks,
        }
    }

    fn say(&self, sender: &str, text: &str) {
        self.bus.relay(sender, text);
    }

    fn lines_containing(&self, needle: &str) -> Vec<SentLine> {
        self.bus
            .transcript()
            .into_iter()
            .filter(|line| line.text.contains(needle))
            .collect()
    }

    /// Responder nicknames in reply order for `fingerprint`.
    fn expected_order(&self, fingerprint: &EventFingerprint) -> Vec<String> {
        let roster = self.bus.roster_for("alice");
        rank_responders(fingerprint, &roster, &ResponderNaming::default())
            .into_iter()
            .map(|peer| peer.display_name.clone())
            .collect()
    }

    async fn stop(self) {
        self.shutdown.send(true).expect("send shutdown");
        for task in self.tasks {
            task.await.expect("join responder");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn integration_only_first_ranked_responder_announces_witness_and_validation() {
    let swarm = Swarm::start(false).await;
    let fingerprint = EventFingerprint::for_submission("alice", "hello");
    let first = swarm.expected_order(&fingerprint)[0].clone();

    swarm.say("alice", "!w hello");
    tokio::time::sleep(Duration::from_secs(10)).await;

    let transcript = swarm.bus.transcript();
    assert_eq!(transcript.len(), 2, "transcript: {transcript:?}");
    let witnessing = &swarm.lines_containing("witnessing")[0];
    assert_eq!(witnessing.sender, first);
    assert_eq!(
        witnessing.text,
        format!("alice: witnessing {}...", fingerprint.to_hex())
    );
    assert!(witnessing.at < Duration::from_millis(50));

    let validated = &swarm.lines_containing("validated!")[0];
    assert_eq!(validated.sender, first);
    assert_eq!(
        validated.text,
        format!("alice: {} validated!", fingerprint.to_hex())
    );

    // Every responder submitted the event to the shared source.
    assert_eq!(swarm.event_source.submitted(), vec![fingerprint; 3]);
    swarm.stop().await;
}

#[tokio::test(start_paused = true)]
async fn integration_partitioned_responders_reply_on_sqrt_slot_schedule() {
    let swarm = Swarm::start(true).await;
    let fingerprint = EventFingerprint::for_submission("alice", "hello");
    let order = swarm.expected_order(&fingerprint);

    swarm.say("alice", "!witness hello");
    tokio::time::sleep(Duration::from_secs(10)).await;

    let mut witnessing = swarm.lines_containing("witnessing");
    witnessing.sort_by_key(|line| line.at);
    let senders: Vec<String> = witnessing.iter().map(|line| line.sender.clone()).collect();
    assert_eq!(senders, order);

    let base = witnessing[0].at;
    let offsets: Vec<Duration> = witnessing.iter().map(|line| line.at - base).collect();
    assert!(offsets[0].is_zero());
    assert!(offsets[1] >= Duration::from_millis(995) && offsets[1] <= Duration::from_millis(1_010));
    assert!(offsets[2] >= Duration::from_millis(1_409) && offsets[2] <= Duration::from_millis(1_425));
    swarm.stop().await;
}

#[tokio::test(start_paused = true)]
async fn integration_validation_of_unknown_event_uses_placeholder_origin() {
    let swarm = Swarm::start(false).await;
    let fingerprint = EventFingerprint::for_submission("mallory", "never witnessed here");

    swarm.event_source.confirm(vec![fingerprint]);
    tokio::time::sleep(Duration::from_secs(10)).await;

    let transcript = swarm.bus.transcript();
    assert_eq!(transcript.len(), 1, "transcript: {transcript:?}");
    assert_eq!(
        transcript[0].text,
        format!("<unknown user>: {} validated!", fingerprint.to_hex())
    );
    assert_eq!(transcript[0].sender, swarm.expected_order(&fingerprint)[0]);
    swarm.stop().await;
}

#[tokio::test(start_paused = true)]
async fn integration_help_is_answered_only_by_addressed_responder() {
    let swarm = Swarm::start(false).await;

    swarm.say("carol", "bot-b: help");
    tokio::time::sleep(Duration::from_secs(1)).await;

    let transcript = swarm.bus.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].sender, "bot-b");
    assert_eq!(
        transcript[0].text,
        "carol: !w[itness] <data> -- create and witness a validated-streams event"
    );
    swarm.stop().await;
}
