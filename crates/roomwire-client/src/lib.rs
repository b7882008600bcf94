//! Sans-IO chat client for STOMP 1.2 over WebSocket backends.
//!
//! The crate centers on [`ChatClient`], a state machine that owns every
//! protocol decision of a room-based chat session and none of its I/O.
//! Callers execute the [`ClientAction`]s it returns (socket writes, REST
//! calls, UI refreshes) and feed the outcomes back:
//!
//! ```text
//!             ┌───────────────────────────────┐
//!  UI ───────►│           ChatClient          │────► ClientAction
//!             │  connection · subscriptions   │      OpenSocket / SendFrame
//!  socket ───►│  store · typing · receipts    │      FetchHistory / PostMessage
//!  REST  ───►│                               │      MessagesChanged / ...
//!             └───────────────────────────────┘
//! ```
//!
//! Time is always a parameter, so reconnect backoff, heart-beats and
//! typing debounce are all driven by [`ChatClient::tick`] and fully
//! deterministic under test.
//!
//! The session model matches a conventional chat backend: live events
//! arrive as JSON envelopes on a per-room STOMP topic, while history,
//! message posts and read receipts go over REST. One room is active at a
//! time; switching rooms swaps the topic subscription and refetches
//! history.
//!
//! The `transport` feature adds a tokio WebSocket pump ([`transport`])
//! for production use; the core stays runtime-free.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod client;
mod connection;
mod error;
mod receipts;
mod store;
mod subscription;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use action::ClientAction;
pub use client::{ChatClient, HISTORY_PAGE_SIZE, Session};
pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_HEARTBEAT, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY,
};
pub use error::ClientError;
pub use store::{Delivery, LocalId, MessageRecord, MessageStore};
pub use subscription::{ActiveSubscription, Subscriptions, Switch};
pub use typing::{
    REMOTE_TYPING_TTL, TYPING_DEBOUNCE, Typist, TypingCoordinator, TypingSignal, TypingTick,
};

pub use roomwire_proto::{
    ChatEvent, Frame, MessageEvent, MessageId, MessageStatus, RoomId, StatusUpdateEvent,
    StopTypingEvent, TypingEvent, UserId,
};
