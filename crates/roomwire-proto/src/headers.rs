//! STOMP header list and the 1.2 escaping rules.
//!
//! Headers are an ordered list of `name:value` pairs. Lookup returns the
//! first occurrence; the STOMP 1.2 repeated-header rule says later entries
//! are historical and must not override the first.
//!
//! In every frame except `CONNECT` and `CONNECTED`, carriage return, line
//! feed, colon and backslash in header names and values travel as the escape
//! sequences `\r`, `\n`, `\c` and `\\`. Undefined sequences are a fatal
//! framing error.

use bytes::BufMut;

use crate::errors::{ProtocolError, Result};

/// Standard header names used by this client.
pub mod names {
    /// Destination a SEND publishes to or a SUBSCRIBE listens on.
    pub const DESTINATION: &str = "destination";
    /// Client-chosen subscription identifier.
    pub const ID: &str = "id";
    /// Subscription a MESSAGE frame was delivered for.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Server-assigned identifier of a MESSAGE frame.
    pub const MESSAGE_ID: &str = "message-id";
    /// MIME type of the frame body.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Body length in bytes.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// Protocol versions the client can speak.
    pub const ACCEPT_VERSION: &str = "accept-version";
    /// Protocol version the server selected.
    pub const VERSION: &str = "version";
    /// Virtual host the client wants to connect to.
    pub const HOST: &str = "host";
    /// Heart-beat offer or reply, `cx,cy` in milliseconds.
    pub const HEART_BEAT: &str = "heart-beat";
    /// Receipt id the client asks the server to acknowledge.
    pub const RECEIPT: &str = "receipt";
    /// Receipt id echoed back in a RECEIPT frame.
    pub const RECEIPT_ID: &str = "receipt-id";
    /// Short human-readable cause on an ERROR frame.
    pub const MESSAGE: &str = "message";
}

/// Ordered STOMP header list.
///
/// Preserves insertion order on encode. [`Headers::get`] returns the first
/// occurrence of a name; [`Headers::push`] can add repeats (the decoder
/// keeps them so nothing is silently dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// First value recorded under `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Replace the first value recorded under `name`, or append it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Append a header without touching existing entries with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Write `raw` with STOMP 1.2 header escaping applied.
pub(crate) fn put_escaped(dst: &mut impl BufMut, raw: &str) {
    for &byte in raw.as_bytes() {
        match byte {
            b'\\' => dst.put_slice(b"\\\\"),
            b'\r' => dst.put_slice(b"\\r"),
            b'\n' => dst.put_slice(b"\\n"),
            b':' => dst.put_slice(b"\\c"),
            other => dst.put_u8(other),
        }
    }
}

/// Reverse STOMP 1.2 header escaping.
///
/// # Errors
///
/// `ProtocolError::BadEscape` for any sequence outside the four defined
/// ones, including a trailing lone backslash.
pub(crate) fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(ProtocolError::BadEscape { sequence: format!("\\{other}") });
            },
            None => {
                return Err(ProtocolError::BadEscape { sequence: "\\".to_string() });
            },
        }
    }
    Ok(out)
}

/// Split one header line into name and value.
///
/// The split happens at the first literal colon; in escaped frames a colon
/// inside a name or value travels as `\c` and never collides with the
/// separator.
///
/// # Errors
///
/// - `ProtocolError::BadHeader` if the line has no colon
/// - `ProtocolError::BadEscape` from [`unescape`] in escaped frames
pub(crate) fn parse_line(line: &str, escaped: bool) -> Result<(String, String)> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(ProtocolError::BadHeader { line: line.to_string() });
    };

    if escaped {
        Ok((unescape(name)?, unescape(value)?))
    } else {
        Ok((name.to_string(), value.to_string()))
    }
}
