use std::time::Duration;

use clap::Parser;

use crate::startup::{BotConfig, EventSourceProtocol};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "vsirc-bot",
    about = "IRC responder that witnesses validated-streams events",
    version
)]
pub struct Cli {
    #[arg(
        value_name = "EVENT_SOURCE",
        help = "Validated-streams node address (e.g. http://127.0.0.1:5555), or 'loopback' to confirm events in-process"
    )]
    pub event_source: String,

    #[arg(value_name = "CHAT_SERVER", help = "IRC server as irc://host[:port] or host[:port]")]
    pub chat_server: String,

    #[arg(value_name = "CHANNEL", help = "Channel to join, e.g. #validated-streams")]
    pub channel: String,

    #[arg(value_name = "NICKNAME", help = "Nickname to register with")]
    pub nickname: String,

    #[arg(
        long = "event-source-protocol",
        env = "VSIRC_EVENT_SOURCE_PROTOCOL",
        value_enum,
        default_value_t = EventSourceProtocol::Grpc,
        help = "Protocol spoken by EVENT_SOURCE: the node's gRPC service or an HTTP/NDJSON gateway"
    )]
    pub event_source_protocol: EventSourceProtocol,

    #[arg(
        long = "responder-prefix",
        env = "VSIRC_RESPONDER_PREFIX",
        default_value = "vs-",
        help = "Account-name prefix shared by every responder"
    )]
    pub responder_prefix: String,

    #[arg(
        long = "reply-delay-scale-ms",
        env = "VSIRC_REPLY_DELAY_SCALE_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Reply delay for slot n is scale * sqrt(n)"
    )]
    pub reply_delay_scale_ms: u64,

    #[arg(
        long = "connect-timeout-ms",
        env = "VSIRC_CONNECT_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for connecting, registering and joining"
    )]
    pub connect_timeout_ms: u64,

    #[arg(
        long = "startup-retry-attempts",
        env = "VSIRC_STARTUP_RETRY_ATTEMPTS",
        default_value_t = 5,
        help = "Retries for connect and join after the first failure"
    )]
    pub startup_retry_attempts: usize,

    #[arg(
        long = "startup-retry-base-delay-ms",
        env = "VSIRC_STARTUP_RETRY_BASE_DELAY_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Retry n of connect or join waits n times this delay"
    )]
    pub startup_retry_base_delay_ms: u64,

    #[arg(
        long = "subscription-retry-base-delay-ms",
        env = "VSIRC_SUBSCRIPTION_RETRY_BASE_DELAY_MS",
        default_value_t = 1_000,
        value_parser = parse_positive_u64,
        help = "Reconnect n of the validated-event subscription waits n times this delay"
    )]
    pub subscription_retry_base_delay_ms: u64,

    #[arg(
        long = "flood-max-messages",
        env = "VSIRC_FLOOD_MAX_MESSAGES",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Outbound channel messages allowed per flood window"
    )]
    pub flood_max_messages: usize,

    #[arg(
        long = "flood-window-ms",
        env = "VSIRC_FLOOD_WINDOW_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Flood window length"
    )]
    pub flood_window_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "VSIRC_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for event-source witness submissions"
    )]
    pub request_timeout_ms: u64,
}

impl Cli {
    pub fn into_config(self) -> BotConfig {
        BotConfig {
            event_source: self.event_source,
            event_source_protocol: self.event_source_protocol,
            chat_server: self.chat_server,
            channel: self.channel,
            nickname: self.nickname,
            responder_prefix: self.responder_prefix,
            reply_delay_scale: Duration::from_millis(self.reply_delay_scale_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            startup_retry_attempts: self.startup_retry_attempts,
            startup_retry_base_delay: Duration::from_millis(self.startup_retry_base_delay_ms),
            subscription_retry_base_delay: Duration::from_millis(
                self.subscription_retry_base_delay_ms,
            ),
            flood_max_messages: self.flood_max_messages,
            flood_window: Duration::from_millis(self.flood_window_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}
