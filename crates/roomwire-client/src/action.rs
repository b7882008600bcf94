//! Actions the client hands back to its caller.
//!
//! The client performs no I/O. Every public method returns a list of
//! [`ClientAction`]s describing the socket writes, REST calls and UI
//! refreshes the caller must perform, in order. Feeding the results back
//! (frames received, history pages, send outcomes) drives the next step.

use roomwire_proto::{Frame, MessageId, RoomId};

use crate::connection::ConnectionState;
use crate::error::ClientError;
use crate::store::LocalId;

/// An effect for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open the WebSocket to the chat endpoint.
    ///
    /// The caller dials its configured URL with `token` attached as the
    /// connection credential, then reports the outcome through
    /// [`ChatClient::transport_up`](crate::ChatClient::transport_up) or
    /// [`ChatClient::transport_down`](crate::ChatClient::transport_down).
    OpenSocket {
        /// Bearer token for the socket handshake.
        token: String,
    },

    /// Close the socket if one is open.
    CloseSocket,

    /// Write a STOMP frame to the socket.
    SendFrame(Frame),

    /// Write a bare heart-beat EOL to the socket.
    SendHeartbeat,

    /// Fetch a page of room history over REST.
    ///
    /// The result is fed back through
    /// [`ChatClient::history_loaded`](crate::ChatClient::history_loaded).
    FetchHistory {
        /// Room to fetch.
        room_id: RoomId,
        /// Zero-based page index; page 0 is the most recent.
        page: u32,
        /// Messages per page.
        size: u32,
    },

    /// Post a new message over REST.
    ///
    /// The outcome is fed back through
    /// [`ChatClient::send_completed`](crate::ChatClient::send_completed) or
    /// [`ChatClient::send_failed`](crate::ChatClient::send_failed) with the
    /// same `local_id`.
    PostMessage {
        /// Target room.
        room_id: RoomId,
        /// Client-side id of the optimistic record.
        local_id: LocalId,
        /// Message text.
        content: String,
    },

    /// Report a message as read over REST.
    ///
    /// The authoritative status change comes back later as a broadcast
    /// status event; the local record is not touched here.
    SendReadReceipt {
        /// Room containing the message.
        room_id: RoomId,
        /// Server id of the message read.
        message_id: MessageId,
    },

    /// The connection state changed; refresh presence indicators.
    ConnectionChanged {
        /// The new state.
        state: ConnectionState,
        /// The failure behind a drop, if there was one.
        error: Option<ClientError>,
    },

    /// A room's message log changed; re-read
    /// [`ChatClient::messages`](crate::ChatClient::messages).
    MessagesChanged {
        /// Room whose log changed.
        room_id: RoomId,
    },

    /// A room's typist set changed; re-read
    /// [`ChatClient::typists`](crate::ChatClient::typists).
    TypingChanged {
        /// Room whose typist set changed.
        room_id: RoomId,
    },

    /// A local send failed; the record is kept and flagged for retry.
    SendFailed {
        /// Room of the failed message.
        room_id: RoomId,
        /// Client-side id of the failed record.
        local_id: LocalId,
        /// Failure description for the UI.
        reason: String,
    },

    /// The server reported an error outside the handshake.
    ServerError {
        /// Server-supplied diagnostic.
        message: String,
    },
}
