//! Fuzz target for STOMP frame decoding.
//!
//! Feeds arbitrary byte sequences into the incremental decoder to find:
//! - Parser crashes or panics
//! - Integer overflows in length handling
//! - Buffer over-reads around the NUL/content-length boundary
//!
//! The decoder must NEVER panic; invalid input returns an error and a
//! decoded frame must survive re-encoding.

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomwire_proto::{Decoded, Frame};

fuzz_target!(|data: &[u8]| {
    let Ok(Decoded::Frame { frame, consumed }) = Frame::decode(data) else {
        return;
    };
    assert!(consumed <= data.len());

    // A decoded frame is well formed by construction, so re-encoding and
    // re-decoding it must succeed and preserve command and body.
    let mut wire = Vec::new();
    frame.encode(&mut wire).expect("decoded frame should re-encode");

    match Frame::decode(&wire).expect("re-encoded frame should decode") {
        Decoded::Frame { frame: again, consumed } => {
            assert_eq!(consumed, wire.len());
            assert_eq!(again.command, frame.command);
            assert_eq!(again.body, frame.body);
        },
        other => panic!("expected a frame, got {other:?}"),
    }
});
