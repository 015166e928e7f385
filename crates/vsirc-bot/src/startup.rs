use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use vsirc_core::{EventSource, OriginTracker, ResponderNaming, SlotDelay};
use vsirc_irc::{IrcClient, IrcClientConfig};
use vsirc_streams::{
    GrpcEventSource, GrpcEventSourceConfig, HttpEventSource, HttpEventSourceConfig,
    LoopbackEventSource,
};

use crate::bot::Bot;

/// Event-source address that selects the in-process loopback source.
pub const LOOPBACK_EVENT_SOURCE: &str = "loopback";

/// Wire protocol used to reach a non-loopback event source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EventSourceProtocol {
    /// The node's `validated_streams.Streams` gRPC service.
    #[default]
    Grpc,
    /// Non-standard HTTP/NDJSON gateway.
    HttpNdjson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `BotConfig` used across responder runtime components.
pub struct BotConfig {
    pub event_source: String,
    pub event_source_protocol: EventSourceProtocol,
    pub chat_server: String,
    pub channel: String,
    pub nickname: String,
    pub responder_prefix: String,
    pub reply_delay_scale: Duration,
    pub connect_timeout: Duration,
    pub startup_retry_attempts: usize,
    pub startup_retry_base_delay: Duration,
    pub subscription_retry_base_delay: Duration,
    pub flood_max_messages: usize,
    pub flood_window: Duration,
    pub request_timeout: Duration,
}

impl BotConfig {
    pub fn irc_client_config(&self) -> IrcClientConfig {
        IrcClientConfig {
            naming: ResponderNaming::new(self.responder_prefix.clone()),
            connect_timeout: self.connect_timeout,
            flood_max_messages: self.flood_max_messages,
            flood_window: self.flood_window,
            ..IrcClientConfig::new(self.chat_server.clone(), self.nickname.clone())
        }
    }

    pub fn grpc_event_source_config(&self) -> GrpcEventSourceConfig {
        GrpcEventSourceConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            ..GrpcEventSourceConfig::new(self.event_source.clone())
        }
    }

    pub fn http_event_source_config(&self) -> HttpEventSourceConfig {
        HttpEventSourceConfig {
            request_timeout: self.request_timeout,
            ..HttpEventSourceConfig::new(self.event_source.clone())
        }
    }
}

/// Runs `operation`, retrying up to `retries` more times after a failure.
///
/// Retry `n` waits `n * base_delay` first. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    retries: usize,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: usize = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < retries => {
                attempt += 1;
                let delay = base_delay.saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX));
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "startup step failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Builds the configured event source. Must be called within a Tokio runtime.
pub fn build_event_source(config: &BotConfig) -> Result<Arc<dyn EventSource>> {
    if config.event_source == LOOPBACK_EVENT_SOURCE {
        tracing::info!("using loopback event source");
        return Ok(Arc::new(LoopbackEventSource::new()));
    }
    let invalid_address = || format!("invalid event source address '{}'", config.event_source);
    match config.event_source_protocol {
        EventSourceProtocol::Grpc => {
            let source = GrpcEventSource::new(config.grpc_event_source_config())
                .with_context(invalid_address)?;
            tracing::info!(event_source = %source.endpoint(), "using grpc event source");
            Ok(Arc::new(source))
        }
        EventSourceProtocol::HttpNdjson => {
            let source = HttpEventSource::new(config.http_event_source_config())
                .with_context(invalid_address)?;
            tracing::info!(event_source = %source.base_url(), "using http/ndjson event source");
            Ok(Arc::new(source))
        }
    }
}

/// Connects, joins and serves one channel until Ctrl-C or a fatal error.
pub async fn run_bot(config: BotConfig) -> Result<()> {
    let event_source = build_event_source(&config)?;

    let irc_config = config.irc_client_config();
    let mut client = retry_with_backoff(
        "connect",
        config.startup_retry_attempts,
        config.startup_retry_base_delay,
        || IrcClient::connect(irc_config.clone()),
    )
    .await
    .with_context(|| format!("failed to connect to chat server {}", config.chat_server))?;

    let channel = retry_with_backoff(
        "join",
        config.startup_retry_attempts,
        config.startup_retry_base_delay,
        || client.join(&config.channel),
    )
    .await
    .with_context(|| format!("failed to join channel {}", config.channel))?;

    let Some(messages) = client.take_messages() else {
        bail!("chat message stream already taken");
    };

    let bot = Bot::new(
        Arc::new(channel),
        event_source,
        Arc::new(OriginTracker::new()),
        ResponderNaming::new(config.responder_prefix.clone()),
        SlotDelay::new(config.reply_delay_scale),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut forwarder = bot
        .validation_forwarder(config.subscription_retry_base_delay)
        .spawn(shutdown_rx.clone());

    let result = tokio::select! {
        result = bot.run(messages, shutdown_rx) => result,
        joined = &mut forwarder => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error).context("validated-event subscription failed"),
            Err(error) => Err(error).context("validated-event forwarder task failed"),
        },
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            Err(error) => Err(error).context("failed to listen for ctrl-c"),
        },
    };

    let _ = shutdown_tx.send(true);
    bot.shutdown();
    client.quit("shutting down");
    if !forwarder.is_finished() {
        let _ = forwarder.await;
    }
    result
}
