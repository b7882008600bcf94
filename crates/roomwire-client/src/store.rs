//! Per-room message logs.
//!
//! The store is the single source of truth the UI renders from. It merges
//! three inputs into one chronological log per room: history pages fetched
//! over REST, live broadcast deliveries, and this client's own optimistic
//! sends. Server message ids deduplicate the first two; optimistic records
//! are tracked by a client-side [`LocalId`] until the server confirms them.

use std::collections::{HashMap, HashSet};

use roomwire_proto::{MessageEvent, MessageId, MessageStatus, RoomId, UserId};

/// Client-generated id for an optimistic outbound message. Stable across
/// confirmation, so the UI can keep row identity while the server id
/// arrives.
pub type LocalId = u64;

/// How settled a record is with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Server-confirmed; the record carries a server id.
    Confirmed,
    /// The send is in flight.
    Pending,
    /// The send failed; the record is eligible for retry.
    Failed,
}

/// One message as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Server id; `None` until an optimistic send is confirmed.
    pub id: Option<MessageId>,
    /// Local id; `Some` for messages this client originated.
    pub local_id: Option<LocalId>,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Message text.
    pub content: String,
    /// Server timestamp; `None` while unconfirmed.
    pub created_at: Option<String>,
    /// Read-state ladder position. Meaningful once confirmed.
    pub status: MessageStatus,
    /// Settlement with the server.
    pub delivery: Delivery,
}

impl MessageRecord {
    fn from_event(event: MessageEvent) -> Self {
        Self {
            id: Some(event.id),
            local_id: None,
            room_id: event.room_id,
            sender_id: event.sender_id,
            content: event.content,
            created_at: Some(event.created_at),
            status: event.status,
            delivery: Delivery::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RoomLog {
    entries: Vec<MessageRecord>,
    /// Server ids present in `entries`.
    ids: HashSet<MessageId>,
}

/// Message logs for every room this client has seen.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    rooms: HashMap<RoomId, RoomLog>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chronological log for a room; empty if the room is unknown.
    #[must_use]
    pub fn messages(&self, room_id: RoomId) -> &[MessageRecord] {
        self.rooms.get(&room_id).map_or(&[], |log| log.entries.as_slice())
    }

    /// Whether a server id is already present in the room's log.
    #[must_use]
    pub fn contains(&self, room_id: RoomId, id: MessageId) -> bool {
        self.rooms.get(&room_id).is_some_and(|log| log.ids.contains(&id))
    }

    /// Record for a server id, if known.
    #[must_use]
    pub fn by_id(&self, room_id: RoomId, id: MessageId) -> Option<&MessageRecord> {
        self.rooms.get(&room_id)?.entries.iter().find(|r| r.id == Some(id))
    }

    /// Merges one REST history page, oldest-first within the batch.
    ///
    /// Pages are fetched newest-page-first, so each batch is older than
    /// everything already in the log and lands at the front. Messages
    /// whose id is already present are dropped. Returns `true` if anything
    /// was added.
    pub fn load_history(&mut self, room_id: RoomId, batch: Vec<MessageEvent>) -> bool {
        let log = self.rooms.entry(room_id).or_default();
        let mut fresh = Vec::new();
        for event in batch {
            if !log.ids.insert(event.id) {
                tracing::debug!(room_id, message_id = event.id, "duplicate history message dropped");
                continue;
            }
            fresh.push(MessageRecord::from_event(event));
        }
        if fresh.is_empty() {
            return false;
        }
        let newer = std::mem::take(&mut log.entries);
        log.entries = fresh;
        log.entries.extend(newer);
        true
    }

    /// Appends a live broadcast delivery. Returns `true` if it was new;
    /// redeliveries and history overlap are dropped by server id.
    pub fn append_live(&mut self, event: MessageEvent) -> bool {
        let log = self.rooms.entry(event.room_id).or_default();
        if !log.ids.insert(event.id) {
            tracing::debug!(
                room_id = event.room_id,
                message_id = event.id,
                "duplicate live message dropped"
            );
            return false;
        }
        log.entries.push(MessageRecord::from_event(event));
        true
    }

    /// Appends an optimistic record for a send this client just issued.
    pub fn append_pending(
        &mut self,
        room_id: RoomId,
        local_id: LocalId,
        sender_id: UserId,
        content: String,
    ) {
        let log = self.rooms.entry(room_id).or_default();
        log.entries.push(MessageRecord {
            id: None,
            local_id: Some(local_id),
            room_id,
            sender_id,
            content,
            created_at: None,
            status: MessageStatus::Sent,
            delivery: Delivery::Pending,
        });
    }

    /// Attaches the server's copy to an optimistic record.
    ///
    /// If the broadcast echo arrived first, the optimistic record is
    /// dropped and the echo inherits its local id; both arrival orders
    /// converge on a single confirmed record. Returns `true` if the log
    /// changed.
    pub fn confirm(&mut self, room_id: RoomId, local_id: LocalId, event: &MessageEvent) -> bool {
        let Some(log) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let Some(pos) = log
            .entries
            .iter()
            .position(|r| r.local_id == Some(local_id) && r.delivery != Delivery::Confirmed)
        else {
            tracing::debug!(room_id, local_id, "confirmation for unknown send ignored");
            return false;
        };
        if log.ids.contains(&event.id) {
            // The echo won the race; keep it, drop the optimistic copy.
            log.entries.remove(pos);
            if let Some(echo) = log.entries.iter_mut().find(|r| r.id == Some(event.id)) {
                echo.local_id = Some(local_id);
            }
            return true;
        }
        log.ids.insert(event.id);
        let record = &mut log.entries[pos];
        record.id = Some(event.id);
        record.created_at = Some(event.created_at.clone());
        record.status = event.status;
        record.delivery = Delivery::Confirmed;
        true
    }

    /// Marks an optimistic record as failed. Returns `true` if found.
    pub fn fail(&mut self, room_id: RoomId, local_id: LocalId) -> bool {
        let Some(log) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let Some(record) = log
            .entries
            .iter_mut()
            .find(|r| r.local_id == Some(local_id) && r.delivery == Delivery::Pending)
        else {
            return false;
        };
        record.delivery = Delivery::Failed;
        true
    }

    /// Flips a failed record back to pending for a retry. Returns the
    /// content to resend, or `None` if there is no failed record with
    /// that id.
    pub fn retry(&mut self, room_id: RoomId, local_id: LocalId) -> Option<String> {
        let log = self.rooms.get_mut(&room_id)?;
        let record = log
            .entries
            .iter_mut()
            .find(|r| r.local_id == Some(local_id) && r.delivery == Delivery::Failed)?;
        record.delivery = Delivery::Pending;
        Some(record.content.clone())
    }

    /// Applies a server status transition.
    ///
    /// The ladder only climbs: a transition at or below the record's
    /// current status is ignored, so a late DELIVERED cannot undo READ.
    /// Unknown rooms and ids are ignored. Returns `true` if changed.
    pub fn apply_status(
        &mut self,
        room_id: RoomId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> bool {
        let Some(log) = self.rooms.get_mut(&room_id) else {
            tracing::debug!(room_id, message_id, "status update for unknown room ignored");
            return false;
        };
        let Some(record) = log.entries.iter_mut().find(|r| r.id == Some(message_id)) else {
            tracing::debug!(room_id, message_id, "status update for unknown message ignored");
            return false;
        };
        if status <= record.status {
            return false;
        }
        record.status = status;
        true
    }

    /// Status of a message, if known.
    #[must_use]
    pub fn status(&self, room_id: RoomId, message_id: MessageId) -> Option<MessageStatus> {
        self.by_id(room_id, message_id).map(|r| r.status)
    }

    /// Drops a room's confirmed records, keeping pending and failed sends
    /// so unsynced work survives a cache clear.
    pub fn clear(&mut self, room_id: RoomId) {
        let Some(log) = self.rooms.get_mut(&room_id) else {
            return;
        };
        log.entries.retain(|r| r.delivery != Delivery::Confirmed);
        log.ids.clear();
        if log.entries.is_empty() {
            self.rooms.remove(&room_id);
        }
    }
}
