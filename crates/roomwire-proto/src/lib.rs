//! Wire layer for the roomwire chat client.
//!
//! Two formats live here:
//!
//! - [`Frame`]: STOMP 1.2 frames, the outer grammar every byte on the
//!   socket belongs to
//! - [`ChatEvent`]: the JSON envelope carried in MESSAGE and SEND bodies
//!
//! plus the destination paths tying rooms to topics. Everything is pure
//! data and codec logic; no I/O, no clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod destination;
mod errors;
mod event;
mod frame;
mod headers;

pub use errors::{ProtocolError, Result};
pub use event::{
    ChatEvent, MessageEvent, MessageStatus, StatusUpdateEvent, StopTypingEvent, TypingEvent,
};
pub use frame::{Command, Decoded, Frame, HEARTBEAT};
pub use headers::{Headers, names};

/// Stable identifier of a chat room.
pub type RoomId = u64;

/// Stable identifier of a user.
pub type UserId = u64;

/// Server-assigned stable identifier of a message.
pub type MessageId = u64;
