//! Validated-streams chat responder: turns `!witness` commands into
//! submitted events and announces witnessing and validation exactly once
//! per channel, arbitrated between every responder present.

pub mod bootstrap_helpers;
pub mod bot;
pub mod cli_args;
pub mod event_ingestor;
pub mod startup;
pub mod validation_forwarder;

#[cfg(test)]
pub(crate) mod test_support;

pub use bot::Bot;
pub use cli_args::Cli;
pub use event_ingestor::{help_text, parse_help_addressee, parse_witness_command, EventIngestor, IngestOutcome};
pub use startup::{
    retry_with_backoff, run_bot, BotConfig, EventSourceProtocol, LOOPBACK_EVENT_SOURCE,
};
pub use validation_forwarder::ValidationForwarder;
