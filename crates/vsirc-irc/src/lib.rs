//! IRC chat transport for validated-streams responders.
//!
//! Implements [`vsirc_core::ChatChannel`] on top of a plain-TCP IRC
//! connection: registration, channel join, roster tracking from
//! NAMES/WHO/JOIN/PART/KICK/QUIT/NICK traffic, keepalive and outbound flood
//! control.

pub mod irc_client;
pub mod irc_message;
pub mod irc_roster;

pub use irc_client::{parse_server_address, FloodGate, IrcChannel, IrcClient, IrcClientConfig};
pub use irc_message::{privmsg_line, sanitize_line_text, IrcMessage, IrcPrefix};
pub use irc_roster::ChannelRoster;
