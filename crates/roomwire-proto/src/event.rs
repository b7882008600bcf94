//! JSON chat event envelope.
//!
//! Everything crossing a room topic is a JSON object discriminated by its
//! `type` field, with camelCase keys. The same envelope is used in both
//! directions: servers broadcast `MESSAGE`, `TYPING`, `STOP_TYPING` and
//! `STATUS_UPDATE`; clients publish `TYPING` and `STOP_TYPING`.

use serde::{Deserialize, Serialize};

use crate::{MessageId, RoomId, UserId, errors::Result};

/// Delivery lifecycle of a message.
///
/// `Ord` follows the lifecycle: `Sent < Delivered < Read`. A stored status
/// only ever advances, so comparing two statuses decides whether an update
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Accepted by the server.
    Sent,
    /// Handed to the recipient's client.
    Delivered,
    /// Seen by the recipient.
    Read,
}

/// A chat message as the server reports it, via history or live delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Server-assigned stable id.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Message text.
    pub content: String,
    /// Server-side creation timestamp, RFC 3339, passed through opaquely.
    pub created_at: String,
    /// Delivery status at the time of the event.
    pub status: MessageStatus,
}

/// A room member started typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    /// Room the member is typing in.
    pub room_id: RoomId,
    /// The typing member.
    pub user_id: UserId,
    /// Display name to show next to the indicator.
    pub user_name: String,
}

/// A room member stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingEvent {
    /// Room the member was typing in.
    pub room_id: RoomId,
    /// The member that stopped.
    pub user_id: UserId,
    /// Carried on client-originated signals; receivers only need the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// A message's delivery status advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateEvent {
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// The message whose status changed.
    pub message_id: MessageId,
    /// The new status.
    pub status: MessageStatus,
}

/// Envelope for everything that crosses a room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEvent {
    /// New message in the room.
    Message(MessageEvent),
    /// A member started typing.
    Typing(TypingEvent),
    /// A member stopped typing.
    StopTyping(StopTypingEvent),
    /// A message's status advanced.
    StatusUpdate(StatusUpdateEvent),
}

impl ChatEvent {
    /// Parse an envelope from JSON text.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BadJson` for malformed JSON, an unknown `type`, or
    /// missing required fields.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Render the envelope as JSON text.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BadJson` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
