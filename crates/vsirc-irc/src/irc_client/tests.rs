//! Tests for the IRC client against a scripted in-process server.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::{timeout, Instant};
use vsirc_core::{ChatChannel, ChatTransportError};

use super::{parse_server_address, FloodGate, IrcClient, IrcClientConfig};

struct ScriptedPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    received: Vec<String>,
}

impl ScriptedPeer {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            received: Vec::new(),
        }
    }

    async fn read_until(&mut self, prefix: &str) {
        while let Some(line) = self.lines.next_line().await.expect("read line") {
            let done = line.starts_with(prefix);
            self.received.push(line);
            if done {
                return;
            }
        }
        panic!("connection closed before '{prefix}'");
    }

    async fn send(&mut self, lines: &[&str]) {
        for line in lines {
            self.writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .expect("write line");
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write bytes");
    }
}

fn test_config(address: std::net::SocketAddr) -> IrcClientConfig {
    let mut config = IrcClientConfig::new(format!("irc://{address}"), "bot");
    config.connect_timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn integration_connect_join_receive_and_send_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let server = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener).await;
        peer.read_until("USER").await;
        peer.send(&[":srv 001 bot_ :Welcome"]).await;
        peer.read_until("JOIN #chan").await;
        peer.send(&[
            ":bot_!~vs-bot@h JOIN #chan",
            ":srv 353 bot_ = #chan :bot_ @peer alice",
            ":srv 366 bot_ #chan :End of /NAMES list.",
        ])
        .await;
        peer.read_until("WHO #chan").await;
        peer.send(&[
            ":srv 352 bot_ #chan ~vs-peer h srv peer H :0 Validated Streams bot",
            ":srv 352 bot_ #chan al h srv alice H :0 Alice",
            ":srv 315 bot_ #chan :End of /WHO list.",
            "PING :keepalive-1",
            ":alice!al@h PRIVMSG #chan :!w hello",
            ":alice!al@h PRIVMSG bot_ :private words",
            ":alice!al@h PRIVMSG #chan :second",
        ])
        .await;
        peer.read_until("PONG").await;
        peer.read_until("PRIVMSG #chan").await;
        peer.received
    });

    let mut client = IrcClient::connect(test_config(address))
        .await
        .expect("connect");
    assert_eq!(client.nickname(), "bot_");
    let channel = client.join("#chan").await.expect("join");
    let mut messages = client.take_messages().expect("message stream");

    let first = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("first message in time")
        .expect("first message");
    assert_eq!(first.text, "!w hello");
    assert_eq!(first.target, "#chan");
    assert_eq!(first.source.nickname, "alice");
    assert_eq!(first.source.account_name.as_deref(), Some("al"));

    let second = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("second message in time")
        .expect("second message");
    assert_eq!(second.text, "second");

    let roster = channel.roster();
    let local = roster.iter().find(|peer| peer.is_local).expect("local peer");
    assert_eq!(local.display_name, "bot_");
    assert_eq!(local.account_name.as_deref(), Some("vs-bot"));
    let peer = roster
        .iter()
        .find(|peer| peer.display_name == "peer")
        .expect("peer");
    assert_eq!(peer.account_name.as_deref(), Some("vs-peer"));
    assert_eq!(channel.local_nickname(), "bot_");

    channel.send_message("hi there").await.expect("send");
    let received = server.await.expect("server task");
    assert!(received.contains(&"NICK bot".to_string()));
    assert!(received.contains(&"USER vs-bot 0 * :Validated Streams bot".to_string()));
    assert!(received.contains(&"PONG :keepalive-1".to_string()));
    assert_eq!(received.last().map(String::as_str), Some("PRIVMSG #chan :hi there"));
}

#[tokio::test]
async fn regression_connect_times_out_without_welcome() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let server = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener).await;
        peer.read_until("USER").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut config = test_config(address);
    config.connect_timeout = Duration::from_millis(200);
    let error = IrcClient::connect(config).await.err().expect("timeout error");
    assert!(matches!(error, ChatTransportError::ConnectTimeout { timeout_ms: 200, .. }));
    server.abort();
}

#[tokio::test]
async fn regression_join_times_out_without_end_of_names() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let server = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener).await;
        peer.read_until("USER").await;
        peer.send(&[":srv 001 bot :Welcome"]).await;
        peer.read_until("JOIN").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut config = test_config(address);
    config.connect_timeout = Duration::from_millis(300);
    let client = IrcClient::connect(config).await.expect("connect");
    let error = client.join("#chan").await.err().expect("join timeout");
    assert!(matches!(error, ChatTransportError::JoinTimeout { ref channel, .. } if channel == "#chan"));
    server.abort();
}

#[tokio::test]
async fn regression_closed_connection_ends_message_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let server = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener).await;
        peer.read_until("USER").await;
        peer.send(&[":srv 001 bot :Welcome"]).await;
    });

    let mut client = IrcClient::connect(test_config(address))
        .await
        .expect("connect");
    let mut messages = client.take_messages().expect("message stream");
    server.await.expect("server task");
    let closed = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("stream closes in time");
    assert!(closed.is_none());
}

#[tokio::test]
async fn regression_non_utf8_line_does_not_end_message_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");
    let server = tokio::spawn(async move {
        let mut peer = ScriptedPeer::accept(&listener).await;
        peer.read_until("USER").await;
        peer.send(&[":srv 001 bot :Welcome"]).await;
        peer.read_until("JOIN #chan").await;
        peer.send(&[
            ":bot!~vs-bot@h JOIN #chan",
            ":srv 353 bot = #chan :bot alice",
            ":srv 366 bot #chan :End of /NAMES list.",
        ])
        .await;
        peer.read_until("WHO #chan").await;
        peer.send_raw(b":mallory!m@h PRIVMSG #chan :caf\xe9 latin-1\r\n")
            .await;
        peer.send(&[":alice!al@h PRIVMSG #chan :!w hello"]).await;
        peer
    });

    let mut client = IrcClient::connect(test_config(address))
        .await
        .expect("connect");
    let _channel = client.join("#chan").await.expect("join");
    let mut messages = client.take_messages().expect("message stream");

    let garbled = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("garbled message in time")
        .expect("stream still open after non-utf8 line");
    assert_eq!(garbled.source.nickname, "mallory");
    assert_eq!(garbled.text, "caf\u{FFFD} latin-1");

    let next = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("next message in time")
        .expect("next message");
    assert_eq!(next.source.nickname, "alice");
    assert_eq!(next.text, "!w hello");

    let _peer = server.await.expect("server task");
    assert!(timeout(Duration::from_millis(100), messages.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn unit_flood_gate_delays_messages_beyond_window_budget() {
    let mut gate = FloodGate::new(4, Duration::from_millis(2_000));
    let started = Instant::now();
    for _ in 0..4 {
        gate.admit().await;
    }
    assert!(started.elapsed() < Duration::from_millis(10));
    gate.admit().await;
    assert!(started.elapsed() >= Duration::from_millis(2_000));
}

#[test]
fn unit_parse_server_address_accepts_scheme_and_default_port() {
    assert_eq!(
        parse_server_address("irc://irc.example:6697").expect("address"),
        ("irc.example".to_string(), 6697)
    );
    assert_eq!(
        parse_server_address("irc.example").expect("address"),
        ("irc.example".to_string(), 6667)
    );
    assert_eq!(
        parse_server_address("irc://[::1]:7000/").expect("address"),
        ("::1".to_string(), 7000)
    );
}

#[test]
fn regression_parse_server_address_rejects_unknown_scheme_and_bad_port() {
    assert!(parse_server_address("https://irc.example").is_err());
    assert!(parse_server_address("irc.example:notaport").is_err());
    assert!(parse_server_address("irc://").is_err());
}
