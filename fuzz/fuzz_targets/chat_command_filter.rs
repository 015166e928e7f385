#![no_main]

use libfuzzer_sys::fuzz_target;
use vsirc_bot::{parse_help_addressee, parse_witness_command};
use vsirc_core::{EventFingerprint, ReplyTemplate};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    if let Some(payload) = parse_witness_command(&text) {
        assert!(!payload.is_empty());
        assert!(parse_help_addressee(&text).is_none());
    }

    for template in [ReplyTemplate::witnessing(), ReplyTemplate::validated()] {
        if let Some(fingerprint) = template.resolved_event(&text) {
            let rendered = template.render(&fingerprint, "fuzz");
            assert_eq!(template.resolved_event(&rendered), Some(fingerprint));
        }
    }

    let fingerprint = EventFingerprint::for_submission("fuzz", &text);
    assert_eq!(EventFingerprint::from_hex(&fingerprint.to_hex()), Ok(fingerprint));
});
