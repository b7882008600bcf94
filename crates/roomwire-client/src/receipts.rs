//! Read receipt decisions.

use roomwire_proto::{MessageId, MessageStatus, RoomId, UserId};

use crate::store::MessageStore;

/// Whether a read receipt for `message_id` should go to the server.
///
/// Receipts are issued only for known, incoming messages still below
/// READ. Own messages are never receipted, and repeat calls for an
/// already-read message stay quiet. The local record is not touched; the
/// authoritative transition arrives later as a broadcast status event.
pub(crate) fn should_mark_read(
    store: &MessageStore,
    me: UserId,
    room_id: RoomId,
    message_id: MessageId,
) -> bool {
    match store.by_id(room_id, message_id) {
        Some(record) => record.sender_id != me && record.status < MessageStatus::Read,
        None => {
            tracing::debug!(room_id, message_id, "read receipt for unknown message skipped");
            false
        },
    }
}
