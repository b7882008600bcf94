//! STOMP 1.2 frame type and wire codec.
//!
//! A frame on the wire is a command line, zero or more header lines, a
//! blank line, then the body terminated by NUL:
//!
//! ```text
//! SEND                          (EOL)
//! destination:/app/rooms/7      (EOL)
//! content-length:14             (EOL)
//!                               (EOL marking end of headers)
//! {"type":"..."}                (NUL)
//! ```
//!
//! EOL is LF, optionally preceded by CR. A lone EOL between frames is a
//! heart-beat. The decoder is incremental: it reports how many bytes a
//! complete unit occupied so the caller can drain a growing read buffer,
//! and asks for more input otherwise.
//!
//! # Invariants
//!
//! - `content-length` on the wire always matches the body. The encoder
//!   derives it from the body and ignores any entry in the header list, so
//!   a mismatched frame cannot be constructed.
//! - Decoded header blocks and bodies respect the `MAX_*` caps below.
//!   Oversized input is a typed error, never a panic or an unbounded
//!   allocation.

use std::str;

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    headers::{self, Headers, names},
};

/// The wire token a sender transmits as its own heart-beat.
pub const HEARTBEAT: &[u8] = b"\n";

/// STOMP 1.2 commands this client speaks or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client opens a session.
    Connect,
    /// Server accepts a session.
    Connected,
    /// Client publishes a body to a destination.
    Send,
    /// Client starts listening on a destination.
    Subscribe,
    /// Client stops a subscription.
    Unsubscribe,
    /// Client ends the session politely.
    Disconnect,
    /// Server delivers a body for a subscription.
    Message,
    /// Server acknowledges a receipt request.
    Receipt,
    /// Server reports a fatal condition.
    Error,
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Whether headers of this frame use STOMP 1.2 escaping.
    ///
    /// CONNECT and CONNECTED are exempt for backward compatibility with
    /// STOMP 1.0 clients; every other frame escapes.
    #[must_use]
    pub const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }

    fn from_line(line: &str) -> Result<Self> {
        match line {
            "CONNECT" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(ProtocolError::UnknownCommand { command: other.to_string() }),
        }
    }
}

/// Result of one incremental [`Frame::decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was parsed.
    Frame {
        /// The parsed frame.
        frame: Frame,
        /// Bytes it occupied at the front of the buffer.
        consumed: usize,
    },
    /// A lone EOL: the peer's heart-beat.
    Heartbeat {
        /// Bytes it occupied at the front of the buffer (1 for LF, 2 for
        /// CRLF).
        consumed: usize,
    },
    /// The buffer does not yet hold a complete unit; read more bytes.
    Incomplete,
}

/// Complete STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Header list.
    pub headers: Headers,
    /// Raw body bytes (JSON text for every body this client exchanges).
    pub body: Bytes,
}

impl Frame {
    /// Longest accepted command or header line, in bytes.
    pub const MAX_HEADER_LINE: usize = 8 * 1024;

    /// Most headers accepted on one frame.
    pub const MAX_HEADERS: usize = 64;

    /// Largest accepted body, in bytes.
    pub const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Create a frame from parts.
    #[must_use]
    pub fn new(command: Command, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self { command, headers, body: body.into() }
    }

    /// CONNECT frame opening a session.
    ///
    /// `heart_beat` is this side's offer in milliseconds: what it can send,
    /// what it would like to receive.
    #[must_use]
    pub fn connect(host: &str, heart_beat: (u32, u32)) -> Self {
        let mut h = Headers::new();
        h.set(names::ACCEPT_VERSION, "1.2");
        h.set(names::HOST, host);
        h.set(names::HEART_BEAT, format!("{},{}", heart_beat.0, heart_beat.1));
        Self::new(Command::Connect, h, Bytes::new())
    }

    /// SUBSCRIBE frame for `destination` under the client-chosen `id`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        let mut h = Headers::new();
        h.set(names::ID, id);
        h.set(names::DESTINATION, destination);
        Self::new(Command::Subscribe, h, Bytes::new())
    }

    /// UNSUBSCRIBE frame ending the subscription `id`.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        let mut h = Headers::new();
        h.set(names::ID, id);
        Self::new(Command::Unsubscribe, h, Bytes::new())
    }

    /// SEND frame publishing a JSON body to `destination`.
    #[must_use]
    pub fn send_json(destination: &str, body: String) -> Self {
        let mut h = Headers::new();
        h.set(names::DESTINATION, destination);
        h.set(names::CONTENT_TYPE, "application/json");
        Self::new(Command::Send, h, body)
    }

    /// DISCONNECT frame for a polite shutdown.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect, Headers::new(), Bytes::new())
    }

    /// `destination` header, if present.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.headers.get(names::DESTINATION)
    }

    /// `subscription` header of a MESSAGE frame, if present.
    #[must_use]
    pub fn subscription(&self) -> Option<&str> {
        self.headers.get(names::SUBSCRIPTION)
    }

    /// `message-id` header of a MESSAGE frame, if present.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(names::MESSAGE_ID)
    }

    /// `message` header of an ERROR frame, if present.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.headers.get(names::MESSAGE)
    }

    /// `version` header of a CONNECTED frame, if present.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.headers.get(names::VERSION)
    }

    /// Parsed `heart-beat` header, if present and well formed.
    #[must_use]
    pub fn heart_beat(&self) -> Option<(u32, u32)> {
        let raw = self.headers.get(names::HEART_BEAT)?;
        let (sx, sy) = raw.split_once(',')?;
        Some((sx.trim().parse().ok()?, sy.trim().parse().ok()?))
    }

    /// Body interpreted as UTF-8 text.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BadUtf8` if the body is not valid UTF-8.
    pub fn body_text(&self) -> Result<&str> {
        str::from_utf8(&self.body).map_err(|_| ProtocolError::BadUtf8)
    }

    /// Encode the frame into `dst`.
    ///
    /// `content-length` is derived from the body; any entry with that name
    /// in the header list is skipped so the wire can never claim a length
    /// the body does not have.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BodyTooLarge` if the body exceeds
    /// [`Frame::MAX_BODY_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.body.len() > Self::MAX_BODY_SIZE {
            return Err(ProtocolError::BodyTooLarge {
                size: self.body.len(),
                max: Self::MAX_BODY_SIZE,
            });
        }

        dst.put_slice(self.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        let escaped = self.command.escapes_headers();
        for (name, value) in self.headers.iter() {
            if name == names::CONTENT_LENGTH {
                continue;
            }
            if escaped {
                headers::put_escaped(dst, name);
                dst.put_u8(b':');
                headers::put_escaped(dst, value);
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        if !self.body.is_empty() {
            dst.put_slice(names::CONTENT_LENGTH.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(self.body.len().to_string().as_bytes());
            dst.put_u8(b'\n');
        }

        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);

        Ok(())
    }

    /// Decode one unit from the front of `buf`.
    ///
    /// Returns [`Decoded::Incomplete`] when more bytes are needed; the
    /// caller keeps the buffer and retries after the next read. On
    /// [`Decoded::Frame`] or [`Decoded::Heartbeat`] the caller drains
    /// `consumed` bytes and may call again for pipelined frames.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] framing violation. Errors are fatal for the
    /// buffer: the stream is desynchronized and the connection should be
    /// dropped.
    pub fn decode(buf: &[u8]) -> Result<Decoded> {
        match (buf.first().copied(), buf.get(1).copied()) {
            (None, _) => return Ok(Decoded::Incomplete),
            (Some(b'\n'), _) => return Ok(Decoded::Heartbeat { consumed: 1 }),
            (Some(b'\r'), Some(b'\n')) => return Ok(Decoded::Heartbeat { consumed: 2 }),
            (Some(b'\r'), None) => return Ok(Decoded::Incomplete),
            _ => {},
        }

        let Some((line, mut pos)) = read_line(buf, 0)? else {
            return Ok(Decoded::Incomplete);
        };
        let command_text = str::from_utf8(line).map_err(|_| ProtocolError::BadUtf8)?;
        let command = Command::from_line(command_text)?;
        let escaped = command.escapes_headers();

        let mut parsed = Headers::new();
        loop {
            let Some((line, next)) = read_line(buf, pos)? else {
                return Ok(Decoded::Incomplete);
            };
            pos = next;
            if line.is_empty() {
                break;
            }
            if parsed.len() == Self::MAX_HEADERS {
                return Err(ProtocolError::TooManyHeaders {
                    count: Self::MAX_HEADERS + 1,
                    max: Self::MAX_HEADERS,
                });
            }
            let text = str::from_utf8(line).map_err(|_| ProtocolError::BadUtf8)?;
            let (name, value) = headers::parse_line(text, escaped)?;
            parsed.push(name, value);
        }

        let body_start = pos;
        let (body_end, consumed) = match parsed.get(names::CONTENT_LENGTH) {
            Some(raw) => {
                let len: usize = raw
                    .parse()
                    .map_err(|_| ProtocolError::BadContentLength { value: raw.to_string() })?;
                if len > Self::MAX_BODY_SIZE {
                    return Err(ProtocolError::BodyTooLarge { size: len, max: Self::MAX_BODY_SIZE });
                }
                let end = body_start + len;
                if buf.len() <= end {
                    return Ok(Decoded::Incomplete);
                }
                if buf.get(end) != Some(&0) {
                    return Err(ProtocolError::MissingNul);
                }
                (end, end + 1)
            },
            None => {
                let tail = buf.get(body_start..).unwrap_or(&[]);
                match tail.iter().position(|&b| b == 0) {
                    Some(idx) => {
                        if idx > Self::MAX_BODY_SIZE {
                            return Err(ProtocolError::BodyTooLarge {
                                size: idx,
                                max: Self::MAX_BODY_SIZE,
                            });
                        }
                        (body_start + idx, body_start + idx + 1)
                    },
                    None => {
                        if tail.len() > Self::MAX_BODY_SIZE {
                            return Err(ProtocolError::BodyTooLarge {
                                size: tail.len(),
                                max: Self::MAX_BODY_SIZE,
                            });
                        }
                        return Ok(Decoded::Incomplete);
                    },
                }
            },
        };

        // INVARIANT: body_start is the cursor after a successfully read
        // blank line and body_end was bounds-checked against buf.len() in
        // both branches above.
        #[allow(clippy::expect_used)]
        let body = Bytes::copy_from_slice(
            buf.get(body_start..body_end).expect("invariant: body bounds checked above"),
        );

        Ok(Decoded::Frame { frame: Self { command, headers: parsed, body }, consumed })
    }
}

/// Read one EOL-terminated line starting at `start`.
///
/// Returns the line with any trailing CR stripped and the cursor just past
/// its LF, or `None` when the buffer ends before an LF.
fn read_line(buf: &[u8], start: usize) -> Result<Option<(&[u8], usize)>> {
    let tail = buf.get(start..).unwrap_or(&[]);
    match tail.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            if idx > Frame::MAX_HEADER_LINE {
                return Err(ProtocolError::HeadersTooLarge {
                    size: idx,
                    max: Frame::MAX_HEADER_LINE,
                });
            }
            let line = &tail[..idx];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            Ok(Some((line, start + idx + 1)))
        },
        None => {
            if tail.len() > Frame::MAX_HEADER_LINE {
                return Err(ProtocolError::HeadersTooLarge {
                    size: tail.len(),
                    max: Frame::MAX_HEADER_LINE,
                });
            }
            Ok(None)
        },
    }
}
