#![no_main]

use libfuzzer_sys::fuzz_target;
use vsirc_irc::{privmsg_line, IrcMessage};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(message) = IrcMessage::parse(&raw) {
        assert!(!message.command.is_empty());
        assert_eq!(message.command, message.command.to_ascii_uppercase());
    }

    let line = privmsg_line("#fuzz", &raw);
    assert!(!line.contains(['\r', '\n', '\0']));
});
