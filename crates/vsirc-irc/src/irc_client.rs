//! Plain-TCP IRC client exposing joined channels as [`ChatChannel`]s.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use vsirc_core::{ChatChannel, ChatMessage, ChatTransportError, ChatUser, PeerIdentity, ResponderNaming};

use crate::irc_message::{privmsg_line, sanitize_line_text, IrcMessage};
use crate::irc_roster::ChannelRoster;

const DEFAULT_IRC_PORT: u16 = 6667;
const DEFAULT_REAL_NAME: &str = "Validated Streams bot";

/// Connection settings for [`IrcClient::connect`].
#[derive(Debug, Clone)]
pub struct IrcClientConfig {
    pub server: String,
    pub nickname: String,
    pub naming: ResponderNaming,
    pub real_name: String,
    pub connect_timeout: Duration,
    pub flood_max_messages: usize,
    pub flood_window: Duration,
}

impl IrcClientConfig {
    pub fn new(server: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            nickname: nickname.into(),
            naming: ResponderNaming::default(),
            real_name: DEFAULT_REAL_NAME.to_string(),
            connect_timeout: Duration::from_secs(10),
            flood_max_messages: 4,
            flood_window: Duration::from_millis(2_000),
        }
    }

    fn account_name(&self) -> String {
        self.naming.account_name_for(&self.nickname)
    }
}

/// Splits `irc://host[:port]` or `host[:port]` into host and port.
pub fn parse_server_address(server: &str) -> Result<(String, u16), ChatTransportError> {
    let invalid = || ChatTransportError::InvalidAddress(server.to_string());
    let trimmed = server.trim();
    let authority = match trimmed.split_once("://") {
        Some(("irc", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => trimmed,
    };
    let authority = authority.trim_end_matches('/');
    if authority.is_empty() {
        return Err(invalid());
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok((host.trim_matches(['[', ']']).to_string(), port))
        }
        Some(_) => Err(invalid()),
        None => Ok((authority.to_string(), DEFAULT_IRC_PORT)),
    }
}

/// Sliding-window limit on outbound messages: at most `max_messages` per `window`.
#[derive(Debug)]
pub struct FloodGate {
    max_messages: usize,
    window: Duration,
    recent: VecDeque<Instant>,
}

impl FloodGate {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            max_messages: max_messages.max(1),
            window,
            recent: VecDeque::new(),
        }
    }

    /// Waits until one more message fits in the window, then records it.
    pub async fn admit(&mut self) {
        loop {
            let now = Instant::now();
            while self
                .recent
                .front()
                .is_some_and(|sent| now.duration_since(*sent) >= self.window)
            {
                self.recent.pop_front();
            }
            if self.recent.len() < self.max_messages {
                self.recent.push_back(now);
                return;
            }
            if let Some(oldest) = self.recent.front().copied() {
                tokio::time::sleep_until(oldest + self.window).await;
            }
        }
    }
}

#[derive(Debug)]
struct OutboundLine {
    line: String,
    throttled: bool,
}

#[derive(Debug, Clone, Default)]
struct ConnectionStatus {
    registered: bool,
    closed: bool,
    joined: HashSet<String>,
}

struct IrcShared {
    outbound: mpsc::UnboundedSender<OutboundLine>,
    status: watch::Sender<ConnectionStatus>,
    nickname: Mutex<String>,
    account_name: String,
    channels: Mutex<HashMap<String, ChannelRoster>>,
}

impl IrcShared {
    fn channels(&self) -> MutexGuard<'_, HashMap<String, ChannelRoster>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn nickname(&self) -> String {
        self.nickname
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_nickname(&self, nickname: &str) {
        *self
            .nickname
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = nickname.to_string();
        for roster in self.channels().values_mut() {
            roster.set_local_nickname(nickname);
        }
    }

    fn queue(&self, line: String, throttled: bool) -> Result<(), ChatTransportError> {
        self.outbound
            .send(OutboundLine { line, throttled })
            .map_err(|_| ChatTransportError::Closed)
    }
}

/// A registered IRC connection.
pub struct IrcClient {
    shared: Arc<IrcShared>,
    config: IrcClientConfig,
    messages: Option<mpsc::UnboundedReceiver<ChatMessage>>,
}

impl IrcClient {
    /// Connects and registers, bounded by `config.connect_timeout`.
    pub async fn connect(config: IrcClientConfig) -> Result<Self, ChatTransportError> {
        let (host, port) = parse_server_address(&config.server)?;
        let timeout_ms = config.connect_timeout.as_millis() as u64;
        tracing::info!(server = %config.server, nickname = %config.nickname, "connecting to chat server");

        let connect = async {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            Ok::<_, ChatTransportError>(Self::start(stream, config.clone()))
        };
        let client = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ChatTransportError::ConnectTimeout {
                    server: config.server.clone(),
                    timeout_ms,
                })
            }
        };

        let mut status = client.shared.status.subscribe();
        let registered = tokio::time::timeout(
            config.connect_timeout,
            status.wait_for(|status| status.registered || status.closed),
        )
        .await;
        match registered {
            Ok(Ok(status)) if status.registered => {}
            Ok(_) => return Err(ChatTransportError::Closed),
            Err(_) => {
                let _ = client.shared.queue("QUIT :registration timed out".to_string(), false);
                return Err(ChatTransportError::ConnectTimeout {
                    server: config.server.clone(),
                    timeout_ms,
                });
            }
        }
        tracing::info!(server = %config.server, nickname = %client.shared.nickname(), "connected to chat server");
        Ok(client)
    }

    fn start(stream: TcpStream, config: IrcClientConfig) -> Self {
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (status_tx, _status_rx) = watch::channel(ConnectionStatus::default());
        let shared = Arc::new(IrcShared {
            outbound: outbound_tx,
            status: status_tx,
            nickname: Mutex::new(config.nickname.clone()),
            account_name: config.account_name(),
            channels: Mutex::new(HashMap::new()),
        });

        let _ = shared.queue(format!("NICK {}", sanitize_line_text(&config.nickname)), false);
        let _ = shared.queue(
            format!(
                "USER {} 0 * :{}",
                sanitize_line_text(&shared.account_name),
                sanitize_line_text(&config.real_name)
            ),
            false,
        );

        let flood_gate = FloodGate::new(config.flood_max_messages, config.flood_window);
        tokio::spawn(run_writer(writer, outbound_rx, flood_gate, Arc::clone(&shared)));
        tokio::spawn(run_reader(reader, messages_tx, Arc::clone(&shared)));

        Self {
            shared,
            config,
            messages: Some(messages_rx),
        }
    }

    /// Joins `channel` and waits for the server's end-of-names reply.
    pub async fn join(&self, channel: &str) -> Result<IrcChannel, ChatTransportError> {
        let channel = channel.trim().to_string();
        let key = channel.to_ascii_lowercase();
        self.shared
            .channels()
            .entry(key.clone())
            .or_insert_with(|| {
                ChannelRoster::new(
                    channel.clone(),
                    self.shared.nickname(),
                    self.shared.account_name.clone(),
                )
            });

        tracing::info!(channel = %channel, "joining channel");
        let mut status = self.shared.status.subscribe();
        self.shared
            .queue(format!("JOIN {}", sanitize_line_text(&channel)), false)?;
        let joined = tokio::time::timeout(
            self.config.connect_timeout,
            status.wait_for(|status| status.joined.contains(&key) || status.closed),
        )
        .await;
        match joined {
            Ok(Ok(status)) if status.joined.contains(&key) => {}
            Ok(_) => return Err(ChatTransportError::Closed),
            Err(_) => {
                return Err(ChatTransportError::JoinTimeout {
                    channel,
                    timeout_ms: self.config.connect_timeout.as_millis() as u64,
                })
            }
        }

        self.shared
            .queue(format!("WHO {}", sanitize_line_text(&channel)), false)?;
        tracing::info!(channel = %channel, "joined channel");
        Ok(IrcChannel {
            shared: Arc::clone(&self.shared),
            name: channel,
            key,
        })
    }

    /// Inbound channel messages. Yields `None` once the connection closes.
    pub fn take_messages(&mut self) -> Option<mpsc::UnboundedReceiver<ChatMessage>> {
        self.messages.take()
    }

    pub fn nickname(&self) -> String {
        self.shared.nickname()
    }

    pub fn quit(&self, reason: &str) {
        let _ = self
            .shared
            .queue(format!("QUIT :{}", sanitize_line_text(reason)), false);
    }
}

async fn run_writer(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<OutboundLine>,
    mut flood_gate: FloodGate,
    shared: Arc<IrcShared>,
) {
    while let Some(OutboundLine { line, throttled }) = outbound.recv().await {
        if throttled {
            flood_gate.admit().await;
        }
        tracing::trace!(line = %line, "irc >>");
        let mut framed = line.into_bytes();
        framed.extend_from_slice(b"\r\n");
        if let Err(error) = writer.write_all(&framed).await {
            tracing::warn!(%error, "failed writing to chat server");
            break;
        }
    }
    shared.status.send_modify(|status| status.closed = true);
}

async fn run_reader(
    reader: OwnedReadHalf,
    messages: mpsc::UnboundedSender<ChatMessage>,
    shared: Arc<IrcShared>,
) {
    // Peers may send non-UTF-8 text; lines are decoded lossily.
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => {
                tracing::warn!("chat server closed the connection");
                break;
            }
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buffer);
                let line = decoded.trim_end_matches(['\r', '\n']);
                tracing::trace!(line = %line, "irc <<");
                if let Some(message) = IrcMessage::parse(line) {
                    handle_server_message(&shared, &messages, message);
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed reading from chat server");
                break;
            }
        }
    }
    shared.status.send_modify(|status| status.closed = true);
}

fn handle_server_message(
    shared: &IrcShared,
    messages: &mpsc::UnboundedSender<ChatMessage>,
    message: IrcMessage,
) {
    match message.command.as_str() {
        "PING" => {
            let token = message.param(0).unwrap_or_default();
            let _ = shared.queue(format!("PONG :{}", sanitize_line_text(token)), false);
            return;
        }
        // RPL_WELCOME carries the nickname the server actually assigned.
        "001" => {
            if let Some(nickname) = message.param(0) {
                shared.set_nickname(nickname);
            }
            shared.status.send_modify(|status| status.registered = true);
            return;
        }
        "433" => {
            tracing::warn!(
                nickname = message.param(1).unwrap_or_default(),
                "nickname already in use"
            );
            return;
        }
        "NICK" => {
            let local = shared.nickname();
            if let (Some(from), Some(to)) = (message.source_nickname(), message.param(0)) {
                if from.eq_ignore_ascii_case(&local) {
                    *shared
                        .nickname
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = to.to_string();
                }
            }
        }
        "PRIVMSG" => {
            if let Some(chat_message) = channel_message(shared, &message) {
                let _ = messages.send(chat_message);
            }
            return;
        }
        _ => {}
    }

    let mut names_complete = Vec::new();
    for (key, roster) in shared.channels().iter_mut() {
        if roster.apply(&message).names_complete {
            names_complete.push(key.clone());
        }
    }
    if !names_complete.is_empty() {
        shared
            .status
            .send_modify(|status| status.joined.extend(names_complete));
    }
}

fn channel_message(shared: &IrcShared, message: &IrcMessage) -> Option<ChatMessage> {
    let prefix = message.prefix.as_ref()?;
    let target = message.param(0)?;
    let text = message.param(1)?;
    if !shared.channels().contains_key(&target.to_ascii_lowercase()) {
        return None;
    }
    Some(ChatMessage {
        source: ChatUser {
            nickname: prefix.nickname.clone(),
            account_name: prefix
                .username
                .as_deref()
                .map(|username| username.trim_start_matches('~').to_string()),
        },
        target: target.to_string(),
        text: text.to_string(),
    })
}

/// A joined IRC channel.
#[derive(Clone)]
pub struct IrcChannel {
    shared: Arc<IrcShared>,
    name: String,
    key: String,
}

#[async_trait]
impl ChatChannel for IrcChannel {
    fn channel_name(&self) -> &str {
        &self.name
    }

    fn local_nickname(&self) -> String {
        self.shared.nickname()
    }

    fn roster(&self) -> Vec<PeerIdentity> {
        self.shared
            .channels()
            .get(&self.key)
            .map(ChannelRoster::snapshot)
            .unwrap_or_default()
    }

    async fn send_message(&self, text: &str) -> Result<(), ChatTransportError> {
        self.shared.queue(privmsg_line(&self.name, text), true)
    }
}

#[cfg(test)]
mod tests;
