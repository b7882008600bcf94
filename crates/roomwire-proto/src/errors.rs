//! Error types for the roomwire wire layer.
//!
//! Strongly-typed errors for frame parsing and envelope decoding. Decode
//! failures carry enough context to log the offending input without keeping
//! the raw bytes around.

use thiserror::Error;

/// Convenience alias for wire-layer results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding STOMP frames and JSON
/// envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line did not match any known STOMP command.
    #[error("unknown STOMP command: {command:?}")]
    UnknownCommand {
        /// The command line as received.
        command: String,
    },

    /// Header line without a `name:value` separator.
    #[error("malformed header line: {line:?}")]
    BadHeader {
        /// The offending header line.
        line: String,
    },

    /// Undefined escape sequence in a header name or value.
    ///
    /// STOMP 1.2 defines `\\`, `\n`, `\r` and `\c`; anything else is a
    /// fatal framing error.
    #[error("undefined header escape sequence: {sequence:?}")]
    BadEscape {
        /// The sequence as received, backslash included.
        sequence: String,
    },

    /// Header block exceeds the decoder's size cap.
    #[error("header block too large: {size} bytes (max {max})")]
    HeadersTooLarge {
        /// Observed header block size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// More headers than the decoder accepts.
    #[error("too many headers: {count} (max {max})")]
    TooManyHeaders {
        /// Observed header count.
        count: usize,
        /// Maximum allowed count.
        max: usize,
    },

    /// Body exceeds the decoder's size cap.
    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge {
        /// Claimed or observed body size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A `content-length` header whose value is not a valid length.
    #[error("invalid content-length: {value:?}")]
    BadContentLength {
        /// The header value as received.
        value: String,
    },

    /// Body delimited by `content-length` was not terminated by NUL.
    #[error("frame body missing NUL terminator")]
    MissingNul,

    /// Command or header bytes were not valid UTF-8.
    #[error("frame metadata is not valid UTF-8")]
    BadUtf8,

    /// JSON envelope failed to encode or decode.
    #[error("invalid JSON envelope: {detail}")]
    BadJson {
        /// Serde's description of the failure.
        detail: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadJson { detail: err.to_string() }
    }
}
