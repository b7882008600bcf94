//! Room subscription bookkeeping.
//!
//! At most one room topic is subscribed at a time. Selecting a room while
//! offline queues it; the queued room is promoted when the session comes
//! up, and a live subscription is demoted back to the queue when the
//! transport drops, so reconnection restores the last selection.
//! Subscription ids are never reused: frames for a dead subscription can
//! stay in flight after an UNSUBSCRIBE, and a stale id must not match the
//! current one.

use roomwire_proto::RoomId;

/// A live subscription to one room's topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    /// Room whose topic this subscription listens on.
    pub room_id: RoomId,
    /// Client-chosen STOMP subscription id.
    pub id: String,
}

/// Outcome of a room selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Switch {
    /// The room is already selected.
    Noop,
    /// Offline: the room is queued and applied when the session comes up.
    Queued,
    /// Protocol work to perform now.
    Apply {
        /// Subscription to end first, if one was live.
        unsubscribe: Option<ActiveSubscription>,
        /// Subscription to start.
        subscribe: ActiveSubscription,
    },
}

/// Tracks the selected room across connection churn.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    active: Option<ActiveSubscription>,
    pending: Option<RoomId>,
    next_id: u64,
}

impl Subscriptions {
    /// Creates empty bookkeeping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live subscription, if the session holds one.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveSubscription> {
        self.active.as_ref()
    }

    /// Room of the live subscription, if any.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.active.as_ref().map(|sub| sub.room_id)
    }

    /// The room the user currently has selected, live or queued.
    #[must_use]
    pub fn selected_room(&self) -> Option<RoomId> {
        self.active_room().or(self.pending)
    }

    /// Selects `room_id`. `connected` decides whether the switch happens
    /// now or waits in the queue.
    pub fn select(&mut self, room_id: RoomId, connected: bool) -> Switch {
        if self.selected_room() == Some(room_id) {
            return Switch::Noop;
        }
        if !connected {
            self.pending = Some(room_id);
            return Switch::Queued;
        }
        let unsubscribe = self.active.take();
        let subscribe = ActiveSubscription { room_id, id: self.fresh_id() };
        self.active = Some(subscribe.clone());
        self.pending = None;
        Switch::Apply { unsubscribe, subscribe }
    }

    /// Promotes the queued room when the session comes up. Returns the
    /// subscription to start, or `None` if nothing was queued.
    pub fn promote_pending(&mut self) -> Option<ActiveSubscription> {
        let room_id = self.pending.take()?;
        let sub = ActiveSubscription { room_id, id: self.fresh_id() };
        self.active = Some(sub.clone());
        Some(sub)
    }

    /// Demotes the live subscription to the queue when the transport
    /// drops. The selection survives; the subscription id does not.
    pub fn demote_active(&mut self) {
        if let Some(active) = self.active.take() {
            self.pending = Some(active.room_id);
        }
    }

    /// Drops the selection entirely. Returns the subscription to end if
    /// one was live.
    pub fn clear(&mut self) -> Option<ActiveSubscription> {
        self.pending = None;
        self.active.take()
    }

    /// Whether a frame tagged with subscription `id` belongs to the live
    /// subscription.
    #[must_use]
    pub fn accepts(&self, id: &str) -> bool {
        self.active.as_ref().is_some_and(|sub| sub.id == id)
    }

    fn fresh_id(&mut self) -> String {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        id
    }
}
