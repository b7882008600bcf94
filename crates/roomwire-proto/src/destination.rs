//! Destination paths tying rooms to STOMP topics.
//!
//! Inbound room traffic arrives on `/topic/rooms/{id}`; client-originated
//! typing signals publish to `/app/rooms/{id}/typing`. Parsing is strict:
//! anything but a bare numeric room segment is rejected.

use crate::RoomId;

/// Prefix of per-room broadcast topics.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/rooms/";

/// Prefix of client-to-server room destinations.
pub const ROOM_APP_PREFIX: &str = "/app/rooms/";

/// Suffix of the typing publish destination.
pub const TYPING_SUFFIX: &str = "/typing";

/// Broadcast topic a client subscribes to for `room_id`.
#[must_use]
pub fn room_topic(room_id: RoomId) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

/// Destination typing signals for `room_id` publish to.
#[must_use]
pub fn typing_destination(room_id: RoomId) -> String {
    format!("{ROOM_APP_PREFIX}{room_id}{TYPING_SUFFIX}")
}

/// Room id of a broadcast topic, or `None` for any other destination.
#[must_use]
pub fn parse_room_topic(destination: &str) -> Option<RoomId> {
    let rest = destination.strip_prefix(ROOM_TOPIC_PREFIX)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}
