//! Fuzz target for the JSON chat event envelope.
//!
//! Arbitrary bytes are interpreted as UTF-8 and fed to the envelope
//! parser. Parsing must never panic, and any envelope that parses must
//! survive a serialize/parse round trip unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomwire_proto::ChatEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(event) = ChatEvent::from_json(text) else {
        return;
    };

    let json = event.to_json().expect("parsed event should serialize");
    let again = ChatEvent::from_json(&json).expect("serialized event should parse");
    assert_eq!(again, event);
});
