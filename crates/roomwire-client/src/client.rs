//! Top-level chat client state machine.
//!
//! [`ChatClient`] composes the connection manager, subscription
//! bookkeeping, message store and typing coordinator behind one facade.
//! It performs no I/O: every method returns [`ClientAction`]s for the
//! caller to execute, and the caller feeds outcomes back in. Time always
//! arrives as a parameter, so the whole client can be driven
//! deterministically.
//!
//! ```text
//!  UI events ──────────► ChatClient ───────► ClientActions
//!  (select room, send,      │  ▲             (frames, REST calls,
//!   keystrokes)             │  │              refresh notifications)
//!                           ▼  │
//!                     socket frames, REST
//!                     results, tick(now)
//! ```

use std::ops::Sub;
use std::time::{Duration, Instant};

use roomwire_proto::{
    ChatEvent, Command, Frame, MessageEvent, MessageId, RoomId, StopTypingEvent, TypingEvent,
    UserId, destination, names,
};

use crate::{
    action::ClientAction,
    connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState},
    error::ClientError,
    receipts,
    store::{LocalId, MessageRecord, MessageStore},
    subscription::{Subscriptions, Switch},
    typing::{Typist, TypingCoordinator, TypingSignal},
};

/// Messages requested per history page.
pub const HISTORY_PAGE_SIZE: u32 = 50;

/// Identity and credentials of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Stable user id.
    pub user_id: UserId,
    /// Display name other members see on typing indicators.
    pub display_name: String,
    /// Bearer token presented when opening the socket.
    pub auth_token: String,
}

/// Sans-IO chat client.
///
/// Generic over the instant type `I` so tests can drive time explicitly;
/// production use defaults to [`Instant`].
#[derive(Debug)]
pub struct ChatClient<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    session: Option<Session>,
    connection: Connection<I>,
    subscriptions: Subscriptions,
    store: MessageStore,
    typing: TypingCoordinator<I>,
    next_local_id: LocalId,
}

impl<I> ChatClient<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            session: None,
            connection: Connection::new(config),
            subscriptions: Subscriptions::new(),
            store: MessageStore::new(),
            typing: TypingCoordinator::new(),
            next_local_id: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The signed-in session, if one was provided.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The room the user has selected, live or queued for reconnect.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.subscriptions.selected_room()
    }

    /// Chronological message log for a room.
    #[must_use]
    pub fn messages(&self, room_id: RoomId) -> &[MessageRecord] {
        self.store.messages(room_id)
    }

    /// Remote members currently typing in a room.
    pub fn typists(&self, room_id: RoomId) -> impl Iterator<Item = &Typist> {
        self.typing.typists(room_id)
    }

    /// Signs in and raises the connection.
    ///
    /// Idempotent while the token is unchanged: calling again during an
    /// active session does nothing, and calling while a reconnect wait is
    /// pending dials immediately instead. A new token lowers the old
    /// session first; a new user id additionally drops the cached logs.
    pub fn connect(&mut self, session: Session, now: I) -> Vec<ClientAction> {
        let before = self.connection.state();
        let previous = self.session.take();
        let same_token = previous.as_ref().is_some_and(|p| p.auth_token == session.auth_token);
        let user_changed = previous.as_ref().is_some_and(|p| p.user_id != session.user_id);
        self.session = Some(session);

        let mut actions = Vec::new();
        if same_token && before != ConnectionState::Disconnected {
            return actions;
        }
        if !same_token && before != ConnectionState::Disconnected {
            tracing::info!("credentials changed, lowering old session");
            let conn = self.connection.shutdown();
            actions.extend(self.run_conn(conn));
            self.subscriptions.demote_active();
            self.typing.reset();
        }
        if user_changed {
            // A different account must not see the old account's cache.
            self.store = MessageStore::new();
            let _ = self.subscriptions.clear();
            self.typing.reset();
        }

        let conn = self.connection.dial(now);
        actions.extend(self.run_conn(conn));
        self.note_state(before, None, &mut actions);
        actions
    }

    /// Lowers the connection deliberately. Idempotent; the room selection
    /// survives for a later [`ChatClient::connect`].
    pub fn disconnect(&mut self) -> Vec<ClientAction> {
        let before = self.connection.state();
        let conn = self.connection.shutdown();
        let mut actions = self.run_conn(conn);
        self.subscriptions.demote_active();
        self.typing.reset();
        self.note_state(before, None, &mut actions);
        actions
    }

    /// Selects `room_id` as the active room.
    ///
    /// Connected, this unsubscribes the previous room, subscribes the new
    /// one and requests its first history page. Offline, the selection is
    /// queued and applied when the session comes up. Reselecting the
    /// current room does nothing.
    pub fn set_active_room(&mut self, room_id: RoomId, now: I) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        // Leaving a room mid-burst closes the typing window politely.
        match self.typing.local_room() {
            Some(burst_room) if burst_room != room_id => {
                let _ = self.typing.finish_local();
                actions.extend(self.publish_typing(burst_room, TypingSignal::Stop, now));
            },
            _ => {},
        }

        match self.subscriptions.select(room_id, self.connection.is_connected()) {
            Switch::Noop => {},
            Switch::Queued => {
                tracing::debug!(room_id, "room selection queued until connected");
            },
            Switch::Apply { unsubscribe, subscribe } => {
                if let Some(old) = unsubscribe {
                    self.push_frame(Frame::unsubscribe(&old.id), now, &mut actions);
                }
                tracing::info!(room_id, subscription = subscribe.id, "subscribing room topic");
                self.push_frame(
                    Frame::subscribe(&subscribe.id, &destination::room_topic(room_id)),
                    now,
                    &mut actions,
                );
                actions.push(ClientAction::FetchHistory {
                    room_id,
                    page: 0,
                    size: HISTORY_PAGE_SIZE,
                });
            },
        }
        actions
    }

    /// Drops the room selection, unsubscribing if live.
    pub fn clear_active_room(&mut self, now: I) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if let Some(burst_room) = self.typing.finish_local() {
            actions.extend(self.publish_typing(burst_room, TypingSignal::Stop, now));
        }
        if let Some(active) = self.subscriptions.clear() {
            self.push_frame(Frame::unsubscribe(&active.id), now, &mut actions);
        }
        actions
    }

    /// Sends a message optimistically.
    ///
    /// The text lands in the room log immediately as a pending record and
    /// goes to the server as a REST post; the outcome comes back through
    /// [`ChatClient::send_completed`] or [`ChatClient::send_failed`].
    /// Whitespace-only text is rejected locally.
    pub fn send_message(&mut self, room_id: RoomId, content: String, now: I) -> Vec<ClientAction> {
        let Some(sender_id) = self.session.as_ref().map(|s| s.user_id) else {
            tracing::warn!("send_message without a session ignored");
            return Vec::new();
        };
        if content.trim().is_empty() {
            tracing::debug!(room_id, "whitespace-only message rejected");
            return Vec::new();
        }

        let local_id = self.next_local_id;
        self.next_local_id += 1;
        self.store.append_pending(room_id, local_id, sender_id, content.clone());

        let mut actions = Vec::new();
        // Sending ends the typing burst in that room.
        match self.typing.local_room() {
            Some(burst_room) if burst_room == room_id => {
                let _ = self.typing.finish_local();
                actions.extend(self.publish_typing(room_id, TypingSignal::Stop, now));
            },
            _ => {},
        }
        actions.push(ClientAction::PostMessage { room_id, local_id, content });
        actions.push(ClientAction::MessagesChanged { room_id });
        actions
    }

    /// Retries a failed send, reusing its record and local id.
    pub fn retry_send(&mut self, room_id: RoomId, local_id: LocalId) -> Vec<ClientAction> {
        match self.store.retry(room_id, local_id) {
            Some(content) => vec![
                ClientAction::PostMessage { room_id, local_id, content },
                ClientAction::MessagesChanged { room_id },
            ],
            None => {
                tracing::debug!(room_id, local_id, "retry for unknown or settled send ignored");
                Vec::new()
            },
        }
    }

    /// Reports a message as read, if a receipt is warranted.
    pub fn mark_read(&mut self, room_id: RoomId, message_id: MessageId) -> Vec<ClientAction> {
        let Some(me) = self.session.as_ref().map(|s| s.user_id) else {
            return Vec::new();
        };
        if receipts::should_mark_read(&self.store, me, room_id, message_id) {
            vec![ClientAction::SendReadReceipt { room_id, message_id }]
        } else {
            Vec::new()
        }
    }

    /// Records a local keystroke in `room_id`, debounced into typing
    /// signals. Signals are only published while connected.
    pub fn local_typing(&mut self, room_id: RoomId, now: I) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for (room, signal) in self.typing.local_input(room_id, now) {
            actions.extend(self.publish_typing(room, signal, now));
        }
        actions
    }

    /// Drops a room's synced log, keeping unsynced sends.
    pub fn clear_room(&mut self, room_id: RoomId) -> Vec<ClientAction> {
        self.store.clear(room_id);
        vec![ClientAction::MessagesChanged { room_id }]
    }

    /// The socket opened; starts the STOMP handshake.
    pub fn transport_up(&mut self, now: I) -> Vec<ClientAction> {
        let before = self.connection.state();
        let conn = self.connection.transport_up(now);
        let mut actions = self.run_conn(conn);
        self.note_state(before, None, &mut actions);
        actions
    }

    /// The socket closed or failed. Schedules a reconnect (unless the
    /// drop followed a deliberate [`ChatClient::disconnect`]) and demotes
    /// the live subscription so reconnection restores it.
    pub fn transport_down(&mut self, reason: &str, now: I) -> Vec<ClientAction> {
        let before = self.connection.state();
        self.connection.transport_down(now);
        if before != ConnectionState::Disconnected {
            self.subscriptions.demote_active();
            self.typing.reset();
            tracing::warn!(reason, retry_in = ?self.connection.retry_delay(), "socket lost");
        }
        let mut actions = Vec::new();
        let error = ClientError::Transport { reason: reason.to_string() };
        self.note_state(before, Some(error), &mut actions);
        actions
    }

    /// A bare heart-beat arrived; counts as proof of life.
    pub fn heartbeat_received(&mut self, now: I) {
        self.connection.record_activity(now);
    }

    /// Handles one inbound STOMP frame.
    pub fn handle_frame(&mut self, frame: &Frame, now: I) -> Vec<ClientAction> {
        self.connection.record_activity(now);
        match frame.command {
            Command::Connected => self.handle_connected(frame, now),
            Command::Message => self.handle_message(frame, now),
            Command::Error => self.handle_error(frame, now),
            Command::Receipt => {
                tracing::debug!(receipt_id = frame.headers.get(names::RECEIPT_ID), "receipt");
                Vec::new()
            },
            other => {
                tracing::warn!(command = other.as_str(), "unexpected frame from server ignored");
                Vec::new()
            },
        }
    }

    /// Feeds back a history page fetched for
    /// [`ClientAction::FetchHistory`]. Pages for a room the user has left
    /// in the meantime are discarded.
    pub fn history_loaded(
        &mut self,
        room_id: RoomId,
        batch: Vec<MessageEvent>,
    ) -> Vec<ClientAction> {
        if self.subscriptions.selected_room() != Some(room_id) {
            tracing::debug!(room_id, "history page for abandoned room discarded");
            return Vec::new();
        }
        if self.store.load_history(room_id, batch) {
            vec![ClientAction::MessagesChanged { room_id }]
        } else {
            Vec::new()
        }
    }

    /// Feeds back a successful [`ClientAction::PostMessage`] with the
    /// server's copy of the message.
    pub fn send_completed(
        &mut self,
        room_id: RoomId,
        local_id: LocalId,
        message: &MessageEvent,
    ) -> Vec<ClientAction> {
        if self.store.confirm(room_id, local_id, message) {
            vec![ClientAction::MessagesChanged { room_id }]
        } else {
            Vec::new()
        }
    }

    /// Feeds back a failed [`ClientAction::PostMessage`]. The record is
    /// kept, flagged, and retries through [`ChatClient::retry_send`].
    pub fn send_failed(
        &mut self,
        room_id: RoomId,
        local_id: LocalId,
        reason: &str,
    ) -> Vec<ClientAction> {
        if self.store.fail(room_id, local_id) {
            tracing::warn!(room_id, local_id, reason, "message send failed");
            vec![
                ClientAction::SendFailed {
                    room_id,
                    local_id,
                    reason: reason.to_string(),
                },
                ClientAction::MessagesChanged { room_id },
            ]
        } else {
            tracing::debug!(room_id, local_id, "failure report for unknown send ignored");
            Vec::new()
        }
    }

    /// Periodic driver. Call at a granularity comfortably below the
    /// heart-beat and typing intervals; once a second is plenty.
    pub fn tick(&mut self, now: I) -> Vec<ClientAction> {
        let before = self.connection.state();
        let conn = self.connection.tick(now);
        let mut actions = self.run_conn(conn);

        let state = self.connection.state();
        if state != before {
            let error = match before {
                ConnectionState::Connected => {
                    self.subscriptions.demote_active();
                    self.typing.reset();
                    Some(ClientError::Transport { reason: "heart-beat timeout".to_string() })
                },
                ConnectionState::Connecting if state == ConnectionState::Disconnected => {
                    Some(ClientError::Handshake { reason: "handshake timeout".to_string() })
                },
                _ => None,
            };
            actions.push(ClientAction::ConnectionChanged { state, error });
        }

        let typing_tick = self.typing.tick(now);
        if let Some(room_id) = typing_tick.stop {
            actions.extend(self.publish_typing(room_id, TypingSignal::Stop, now));
        }
        for room_id in typing_tick.expired {
            actions.push(ClientAction::TypingChanged { room_id });
        }
        actions
    }

    fn handle_connected(&mut self, frame: &Frame, now: I) -> Vec<ClientAction> {
        let before = self.connection.state();
        let conn = self.connection.handle_connected(frame, now);
        let mut actions = self.run_conn(conn);
        self.note_state(before, None, &mut actions);

        if self.connection.is_connected() && before != ConnectionState::Connected {
            if let Some(sub) = self.subscriptions.promote_pending() {
                tracing::info!(
                    room_id = sub.room_id,
                    subscription = sub.id,
                    "restoring room subscription"
                );
                self.push_frame(
                    Frame::subscribe(&sub.id, &destination::room_topic(sub.room_id)),
                    now,
                    &mut actions,
                );
                actions.push(ClientAction::FetchHistory {
                    room_id: sub.room_id,
                    page: 0,
                    size: HISTORY_PAGE_SIZE,
                });
            }
        }
        actions
    }

    fn handle_message(&mut self, frame: &Frame, now: I) -> Vec<ClientAction> {
        let Some(sub_id) = frame.subscription() else {
            tracing::warn!("MESSAGE frame without subscription header dropped");
            return Vec::new();
        };
        if !self.subscriptions.accepts(sub_id) {
            tracing::debug!(subscription = sub_id, "frame for dead subscription dropped");
            return Vec::new();
        }
        let text = match frame.body_text() {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "MESSAGE body is not text");
                return Vec::new();
            },
        };
        match ChatEvent::from_json(text) {
            Ok(event) => self.dispatch_event(event, now),
            Err(error) => {
                tracing::warn!(%error, "undecodable chat event dropped");
                Vec::new()
            },
        }
    }

    fn dispatch_event(&mut self, event: ChatEvent, now: I) -> Vec<ClientAction> {
        let active = self.subscriptions.active_room();
        match event {
            ChatEvent::Message(message) => {
                if Some(message.room_id) != active {
                    tracing::debug!(room_id = message.room_id, "message for inactive room dropped");
                    return Vec::new();
                }
                let room_id = message.room_id;
                let sender_id = message.sender_id;
                if !self.store.append_live(message) {
                    return Vec::new();
                }
                let mut actions = vec![ClientAction::MessagesChanged { room_id }];
                // A delivered message ends its author's typing burst.
                if self.typing.remote_stopped(room_id, sender_id) {
                    actions.push(ClientAction::TypingChanged { room_id });
                }
                actions
            },
            ChatEvent::Typing(event) => {
                let Some(me) = self.session.as_ref().map(|s| s.user_id) else {
                    return Vec::new();
                };
                if event.user_id == me || Some(event.room_id) != active {
                    return Vec::new();
                }
                if self.typing.remote_started(event.room_id, event.user_id, &event.user_name, now) {
                    vec![ClientAction::TypingChanged { room_id: event.room_id }]
                } else {
                    Vec::new()
                }
            },
            ChatEvent::StopTyping(event) => {
                if Some(event.room_id) != active {
                    tracing::debug!(
                        room_id = event.room_id,
                        "stop-typing for inactive room dropped"
                    );
                    return Vec::new();
                }
                if self.typing.remote_stopped(event.room_id, event.user_id) {
                    vec![ClientAction::TypingChanged { room_id: event.room_id }]
                } else {
                    Vec::new()
                }
            },
            ChatEvent::StatusUpdate(update) => {
                if Some(update.room_id) != active {
                    tracing::debug!(room_id = update.room_id, "status for inactive room dropped");
                    return Vec::new();
                }
                if self.store.apply_status(update.room_id, update.message_id, update.status) {
                    vec![ClientAction::MessagesChanged { room_id: update.room_id }]
                } else {
                    Vec::new()
                }
            },
        }
    }

    fn handle_error(&mut self, frame: &Frame, now: I) -> Vec<ClientAction> {
        let message = frame.error_message().unwrap_or("server error").to_string();
        if self.connection.state() == ConnectionState::Connecting {
            let before = self.connection.state();
            let conn = self.connection.handshake_failed(now);
            let mut actions = self.run_conn(conn);
            tracing::warn!(message, retry_in = ?self.connection.retry_delay(), "handshake failed");
            let error = ClientError::Handshake { reason: message };
            self.note_state(before, Some(error), &mut actions);
            actions
        } else {
            tracing::warn!(message, "server reported an error");
            vec![ClientAction::ServerError { message }]
        }
    }

    /// Translates connection effects into client actions.
    fn run_conn(&self, conn_actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for action in conn_actions {
            match action {
                ConnectionAction::Dial => match &self.session {
                    Some(session) => actions.push(ClientAction::OpenSocket {
                        token: session.auth_token.clone(),
                    }),
                    None => tracing::error!("dial requested without a session"),
                },
                ConnectionAction::SendFrame(frame) => actions.push(ClientAction::SendFrame(frame)),
                ConnectionAction::SendHeartbeat => actions.push(ClientAction::SendHeartbeat),
                ConnectionAction::Close { reason } => {
                    tracing::debug!(reason, "closing socket");
                    actions.push(ClientAction::CloseSocket);
                },
            }
        }
        actions
    }

    /// Appends a frame send, counting it as outbound traffic so the idle
    /// heart-beat defers.
    fn push_frame(&mut self, frame: Frame, now: I, actions: &mut Vec<ClientAction>) {
        self.connection.record_send(now);
        actions.push(ClientAction::SendFrame(frame));
    }

    /// Builds and appends a typing signal publish for `room_id`.
    /// Suppressed while not connected: typing is ephemeral and is never
    /// queued for later delivery.
    fn publish_typing(
        &mut self,
        room_id: RoomId,
        signal: TypingSignal,
        now: I,
    ) -> Vec<ClientAction> {
        if !self.connection.is_connected() {
            return Vec::new();
        }
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let event = match signal {
            TypingSignal::Start => ChatEvent::Typing(TypingEvent {
                room_id,
                user_id: session.user_id,
                user_name: session.display_name.clone(),
            }),
            TypingSignal::Stop => ChatEvent::StopTyping(StopTypingEvent {
                room_id,
                user_id: session.user_id,
                user_name: Some(session.display_name.clone()),
            }),
        };
        match event.to_json() {
            Ok(body) => {
                let frame = Frame::send_json(&destination::typing_destination(room_id), body);
                let mut actions = Vec::new();
                self.push_frame(frame, now, &mut actions);
                actions
            },
            Err(error) => {
                tracing::warn!(%error, "typing signal serialization failed");
                Vec::new()
            },
        }
    }

    fn note_state(
        &self,
        before: ConnectionState,
        error: Option<ClientError>,
        actions: &mut Vec<ClientAction>,
    ) {
        let state = self.connection.state();
        if state != before {
            actions.push(ClientAction::ConnectionChanged { state, error });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use roomwire_proto::{Headers, MessageStatus, StatusUpdateEvent};

    use crate::store::Delivery;

    const ME: UserId = 42;
    const ROOM: RoomId = 7;
    const OTHER_ROOM: RoomId = 9;
    const PEER: UserId = 99;

    fn session() -> Session {
        Session {
            user_id: ME,
            display_name: "me".to_string(),
            auth_token: "tok-1".to_string(),
        }
    }

    fn connected_frame() -> Frame {
        let mut headers = Headers::new();
        headers.set(names::VERSION, "1.2");
        Frame::new(Command::Connected, headers, "")
    }

    fn error_frame(message: &str) -> Frame {
        let mut headers = Headers::new();
        headers.set(names::MESSAGE, message);
        Frame::new(Command::Error, headers, "")
    }

    fn event_frame(sub_id: &str, room_id: RoomId, event: &ChatEvent) -> Frame {
        let mut headers = Headers::new();
        headers.set(names::SUBSCRIPTION, sub_id);
        headers.set(names::DESTINATION, destination::room_topic(room_id));
        headers.set(names::MESSAGE_ID, "b-1");
        Frame::new(Command::Message, headers, event.to_json().unwrap())
    }

    fn live_message(id: MessageId, room_id: RoomId, sender_id: UserId) -> MessageEvent {
        MessageEvent {
            id,
            room_id,
            sender_id,
            content: format!("message {id}"),
            created_at: "2025-04-01T10:00:00Z".to_string(),
            status: MessageStatus::Sent,
        }
    }

    fn raise(client: &mut ChatClient, t0: Instant) -> Vec<ClientAction> {
        let mut actions = client.connect(session(), t0);
        actions.extend(client.transport_up(t0));
        actions.extend(client.handle_frame(&connected_frame(), t0));
        actions
    }

    fn subscription_id(actions: &[ClientAction]) -> String {
        actions
            .iter()
            .find_map(|action| match action {
                ClientAction::SendFrame(frame) if frame.command == Command::Subscribe => {
                    frame.headers.get(names::ID).map(str::to_string)
                },
                _ => None,
            })
            .expect("no SUBSCRIBE frame in actions")
    }

    fn sent_commands(actions: &[ClientAction]) -> Vec<Command> {
        actions
            .iter()
            .filter_map(|action| match action {
                ClientAction::SendFrame(frame) => Some(frame.command),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_flow_reaches_connected() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());

        let actions = client.connect(session(), t0);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], ClientAction::OpenSocket { token: "tok-1".to_string() });
        assert!(matches!(
            actions[1],
            ClientAction::ConnectionChanged { state: ConnectionState::Connecting, error: None }
        ));

        let actions = client.transport_up(t0);
        assert_eq!(sent_commands(&actions), vec![Command::Connect]);

        let actions = client.handle_frame(&connected_frame(), t0);
        assert!(actions.contains(&ClientAction::ConnectionChanged {
            state: ConnectionState::Connected,
            error: None,
        }));
        assert_eq!(client.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_is_idempotent_while_raised() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);

        assert!(client.connect(session(), t0).is_empty());
        assert_eq!(client.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn new_token_lowers_and_redials() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let refreshed = Session { auth_token: "tok-2".to_string(), ..session() };
        let actions = client.connect(refreshed, t0);
        assert_eq!(sent_commands(&actions), vec![Command::Disconnect]);
        assert!(actions.contains(&ClientAction::CloseSocket));
        assert!(actions.contains(&ClientAction::OpenSocket { token: "tok-2".to_string() }));

        // The selection survives and is restored on the new session.
        let _ = client.transport_up(t0);
        let actions = client.handle_frame(&connected_frame(), t0);
        assert!(sent_commands(&actions).contains(&Command::Subscribe));
        assert_eq!(client.active_room(), Some(ROOM));
    }

    #[test]
    fn new_user_drops_the_cached_logs() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let setup = raise(&mut client, t0);
        assert!(setup.iter().any(|a| matches!(a, ClientAction::ConnectionChanged { .. })));
        let actions = client.set_active_room(ROOM, t0);
        let sub = subscription_id(&actions);
        let event = ChatEvent::Message(live_message(1, ROOM, PEER));
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &event), t0);
        assert_eq!(client.messages(ROOM).len(), 1);

        let other_account = Session {
            user_id: 43,
            display_name: "someone".to_string(),
            auth_token: "tok-2".to_string(),
        };
        let _ = client.connect(other_account, t0);
        assert!(client.messages(ROOM).is_empty());
        assert_eq!(client.active_room(), None);
    }

    #[test]
    fn selecting_a_room_subscribes_and_fetches_history() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);

        let actions = client.set_active_room(ROOM, t0);
        let ClientAction::SendFrame(frame) = &actions[0] else {
            panic!("expected SUBSCRIBE first, got {actions:?}");
        };
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.destination(), Some("/topic/rooms/7"));
        assert_eq!(frame.headers.get(names::ID), Some("sub-0"));
        assert_eq!(
            actions[1],
            ClientAction::FetchHistory { room_id: ROOM, page: 0, size: HISTORY_PAGE_SIZE }
        );

        assert!(client.set_active_room(ROOM, t0).is_empty());
    }

    #[test]
    fn switching_rooms_unsubscribes_first() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let actions = client.set_active_room(OTHER_ROOM, t0);
        assert_eq!(sent_commands(&actions), vec![Command::Unsubscribe, Command::Subscribe]);
        assert_eq!(client.active_room(), Some(OTHER_ROOM));
    }

    #[test]
    fn offline_selection_applies_on_connect() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());

        assert!(client.set_active_room(ROOM, t0).is_empty());
        assert_eq!(client.active_room(), Some(ROOM));

        let actions = raise(&mut client, t0);
        assert!(sent_commands(&actions).contains(&Command::Subscribe));
        assert!(actions.contains(&ClientAction::FetchHistory {
            room_id: ROOM,
            page: 0,
            size: HISTORY_PAGE_SIZE,
        }));
    }

    #[test]
    fn live_messages_update_store_once() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let event = ChatEvent::Message(live_message(1, ROOM, PEER));
        let frame = event_frame(&sub, ROOM, &event);

        let actions = client.handle_frame(&frame, t0);
        assert_eq!(actions, vec![ClientAction::MessagesChanged { room_id: ROOM }]);
        assert_eq!(client.messages(ROOM).len(), 1);

        // Redelivery of the same broadcast changes nothing.
        assert!(client.handle_frame(&frame, t0).is_empty());
        assert_eq!(client.messages(ROOM).len(), 1);
    }

    #[test]
    fn frames_for_dead_subscriptions_are_dropped() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let old_sub = subscription_id(&client.set_active_room(ROOM, t0));
        let _ = client.set_active_room(OTHER_ROOM, t0);

        let event = ChatEvent::Message(live_message(1, ROOM, PEER));
        let actions = client.handle_frame(&event_frame(&old_sub, ROOM, &event), t0);
        assert!(actions.is_empty());
        assert!(client.messages(ROOM).is_empty());
    }

    #[test]
    fn message_for_a_different_room_than_active_is_dropped() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let stray = ChatEvent::Message(live_message(1, OTHER_ROOM, PEER));
        let actions = client.handle_frame(&event_frame(&sub, ROOM, &stray), t0);
        assert!(actions.is_empty());
        assert!(client.messages(OTHER_ROOM).is_empty());
    }

    #[test]
    fn status_update_for_a_different_room_than_active_is_dropped() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));
        let event = ChatEvent::Message(live_message(1, ROOM, PEER));
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &event), t0);
        let live = subscription_id(&client.set_active_room(OTHER_ROOM, t0));

        // Carried on the live subscription, but naming the retained old room.
        let stray = ChatEvent::StatusUpdate(StatusUpdateEvent {
            room_id: ROOM,
            message_id: 1,
            status: MessageStatus::Read,
        });
        let actions = client.handle_frame(&event_frame(&live, OTHER_ROOM, &stray), t0);
        assert!(actions.is_empty());
        assert_eq!(client.messages(ROOM)[0].status, MessageStatus::Sent);
    }

    #[test]
    fn stop_typing_for_a_different_room_than_active_is_dropped() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));
        let typing = ChatEvent::Typing(TypingEvent {
            room_id: ROOM,
            user_id: PEER,
            user_name: "ana".to_string(),
        });
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &typing), t0);
        assert_eq!(client.typists(ROOM).count(), 1);
        let live = subscription_id(&client.set_active_room(OTHER_ROOM, t0));

        let stray = ChatEvent::StopTyping(StopTypingEvent {
            room_id: ROOM,
            user_id: PEER,
            user_name: None,
        });
        let actions = client.handle_frame(&event_frame(&live, OTHER_ROOM, &stray), t0);
        assert!(actions.is_empty());
        // The old room's typist is left to the idle fallback in tick.
        assert_eq!(client.typists(ROOM).count(), 1);
    }

    #[test]
    fn history_for_an_abandoned_room_is_discarded() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let stale = client.history_loaded(OTHER_ROOM, vec![live_message(1, OTHER_ROOM, PEER)]);
        assert!(stale.is_empty());
        assert!(client.messages(OTHER_ROOM).is_empty());

        let actions = client.history_loaded(ROOM, vec![live_message(1, ROOM, PEER)]);
        assert_eq!(actions, vec![ClientAction::MessagesChanged { room_id: ROOM }]);
        assert_eq!(client.messages(ROOM).len(), 1);
    }

    #[test]
    fn reconnect_restores_the_subscription_and_refetches() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let first_sub = subscription_id(&client.set_active_room(ROOM, t0));

        let actions = client.transport_down("connection reset", t0);
        assert_eq!(
            actions,
            vec![ClientAction::ConnectionChanged {
                state: ConnectionState::Disconnected,
                error: Some(ClientError::Transport { reason: "connection reset".to_string() }),
            }]
        );
        assert_eq!(client.active_room(), Some(ROOM));

        // Backoff: nothing at 4s, redial at 5s.
        assert!(client.tick(t0 + Duration::from_secs(4)).is_empty());
        let actions = client.tick(t0 + Duration::from_secs(5));
        assert!(actions.contains(&ClientAction::OpenSocket { token: "tok-1".to_string() }));

        let t1 = t0 + Duration::from_secs(6);
        let _ = client.transport_up(t1);
        let actions = client.handle_frame(&connected_frame(), t1);
        let new_sub = subscription_id(&actions);
        assert_ne!(new_sub, first_sub);
        assert!(actions.contains(&ClientAction::FetchHistory {
            room_id: ROOM,
            page: 0,
            size: HISTORY_PAGE_SIZE,
        }));
    }

    #[test]
    fn send_message_is_optimistic_and_converges() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let actions = client.send_message(ROOM, "hello there".to_string(), t0);
        let ClientAction::PostMessage { local_id, .. } = actions[0] else {
            panic!("expected a post, got {actions:?}");
        };
        assert_eq!(actions[1], ClientAction::MessagesChanged { room_id: ROOM });
        assert_eq!(client.messages(ROOM)[0].delivery, Delivery::Pending);

        let mut server_copy = live_message(10, ROOM, ME);
        server_copy.content = "hello there".to_string();
        let actions = client.send_completed(ROOM, local_id, &server_copy);
        assert_eq!(actions, vec![ClientAction::MessagesChanged { room_id: ROOM }]);

        let records = client.messages(ROOM);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, Some(10));
        assert_eq!(records[0].delivery, Delivery::Confirmed);

        // The broadcast echo of our own message is a duplicate.
        let echo = ChatEvent::Message(server_copy);
        assert!(client.handle_frame(&event_frame(&sub, ROOM, &echo), t0).is_empty());
        assert_eq!(client.messages(ROOM).len(), 1);
    }

    #[test]
    fn whitespace_only_messages_are_rejected() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        assert!(client.send_message(ROOM, "   \n\t".to_string(), t0).is_empty());
        assert!(client.messages(ROOM).is_empty());
    }

    #[test]
    fn failed_sends_flag_the_record_and_retry() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let actions = client.send_message(ROOM, "hello".to_string(), t0);
        let ClientAction::PostMessage { local_id, .. } = actions[0] else {
            panic!("expected a post, got {actions:?}");
        };

        let actions = client.send_failed(ROOM, local_id, "503 service unavailable");
        assert!(matches!(actions[0], ClientAction::SendFailed { .. }));
        assert_eq!(client.messages(ROOM)[0].delivery, Delivery::Failed);

        let actions = client.retry_send(ROOM, local_id);
        assert_eq!(
            actions[0],
            ClientAction::PostMessage {
                room_id: ROOM,
                local_id,
                content: "hello".to_string(),
            }
        );
        assert_eq!(client.messages(ROOM)[0].delivery, Delivery::Pending);

        assert!(client.retry_send(ROOM, 999).is_empty());
    }

    #[test]
    fn sends_work_while_the_socket_is_down() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = client.connect(session(), t0);

        let actions = client.send_message(ROOM, "offline note".to_string(), t0);
        assert!(matches!(actions[0], ClientAction::PostMessage { .. }));
        assert_eq!(client.messages(ROOM).len(), 1);
    }

    #[test]
    fn mark_read_receipts_only_incoming_unread() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let incoming = ChatEvent::Message(live_message(1, ROOM, PEER));
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &incoming), t0);

        let actions = client.mark_read(ROOM, 1);
        assert_eq!(actions, vec![ClientAction::SendReadReceipt { room_id: ROOM, message_id: 1 }]);

        // The authoritative transition arrives as a broadcast; after it,
        // further receipts stay quiet.
        let update = ChatEvent::StatusUpdate(StatusUpdateEvent {
            room_id: ROOM,
            message_id: 1,
            status: MessageStatus::Read,
        });
        let actions = client.handle_frame(&event_frame(&sub, ROOM, &update), t0);
        assert_eq!(actions, vec![ClientAction::MessagesChanged { room_id: ROOM }]);
        assert!(client.mark_read(ROOM, 1).is_empty());

        // Unknown ids and own messages never produce receipts.
        assert!(client.mark_read(ROOM, 999).is_empty());
        let mine = ChatEvent::Message(live_message(2, ROOM, ME));
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &mine), t0);
        assert!(client.mark_read(ROOM, 2).is_empty());
    }

    #[test]
    fn typing_burst_publishes_start_and_stop_once() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let actions = client.local_typing(ROOM, t0);
        assert_eq!(actions.len(), 1);
        let ClientAction::SendFrame(frame) = &actions[0] else {
            panic!("expected a SEND frame, got {actions:?}");
        };
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.destination(), Some("/app/rooms/7/typing"));
        assert!(frame.body_text().unwrap().contains("\"TYPING\""));

        // More keystrokes inside the window publish nothing.
        assert!(client.local_typing(ROOM, t0 + Duration::from_millis(500)).is_empty());

        let actions = client.tick(t0 + Duration::from_millis(2600));
        assert_eq!(actions.len(), 1);
        let ClientAction::SendFrame(frame) = &actions[0] else {
            panic!("expected a SEND frame, got {actions:?}");
        };
        assert!(frame.body_text().unwrap().contains("\"STOP_TYPING\""));
    }

    #[test]
    fn sending_a_message_ends_the_typing_burst() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);
        let _ = client.local_typing(ROOM, t0);

        let actions = client.send_message(ROOM, "done".to_string(), t0);
        let ClientAction::SendFrame(frame) = &actions[0] else {
            panic!("expected STOP_TYPING first, got {actions:?}");
        };
        assert!(frame.body_text().unwrap().contains("\"STOP_TYPING\""));

        // The window is closed; the debounce timer has nothing to expire.
        assert!(client.tick(t0 + Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn typing_signals_are_suppressed_offline() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = client.connect(session(), t0);
        let _ = client.set_active_room(ROOM, t0);

        assert!(client.local_typing(ROOM, t0).is_empty());
    }

    #[test]
    fn remote_typists_appear_and_expire() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let typing = ChatEvent::Typing(TypingEvent {
            room_id: ROOM,
            user_id: PEER,
            user_name: "ana".to_string(),
        });
        let actions = client.handle_frame(&event_frame(&sub, ROOM, &typing), t0);
        assert_eq!(actions, vec![ClientAction::TypingChanged { room_id: ROOM }]);
        assert_eq!(client.typists(ROOM).count(), 1);

        // Our own echoed signal is ignored.
        let own = ChatEvent::Typing(TypingEvent {
            room_id: ROOM,
            user_id: ME,
            user_name: "me".to_string(),
        });
        assert!(client.handle_frame(&event_frame(&sub, ROOM, &own), t0).is_empty());

        let actions = client.tick(t0 + Duration::from_secs(7));
        assert!(actions.contains(&ClientAction::TypingChanged { room_id: ROOM }));
        assert_eq!(client.typists(ROOM).count(), 0);
    }

    #[test]
    fn a_message_clears_its_authors_typing_indicator() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let sub = subscription_id(&client.set_active_room(ROOM, t0));

        let typing = ChatEvent::Typing(TypingEvent {
            room_id: ROOM,
            user_id: PEER,
            user_name: "ana".to_string(),
        });
        let _ = client.handle_frame(&event_frame(&sub, ROOM, &typing), t0);

        let message = ChatEvent::Message(live_message(1, ROOM, PEER));
        let actions = client.handle_frame(&event_frame(&sub, ROOM, &message), t0);
        assert_eq!(
            actions,
            vec![
                ClientAction::MessagesChanged { room_id: ROOM },
                ClientAction::TypingChanged { room_id: ROOM },
            ]
        );
        assert_eq!(client.typists(ROOM).count(), 0);
    }

    #[test]
    fn server_errors_surface_without_dropping_the_session() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);

        let actions = client.handle_frame(&error_frame("quota exceeded"), t0);
        assert_eq!(
            actions,
            vec![ClientAction::ServerError { message: "quota exceeded".to_string() }]
        );
        assert_eq!(client.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn handshake_rejection_backs_off_and_redials() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = client.connect(session(), t0);
        let _ = client.transport_up(t0);

        let actions = client.handle_frame(&error_frame("bad token"), t0);
        assert!(actions.contains(&ClientAction::CloseSocket));
        assert!(actions.contains(&ClientAction::ConnectionChanged {
            state: ConnectionState::Disconnected,
            error: Some(ClientError::Handshake { reason: "bad token".to_string() }),
        }));

        let actions = client.tick(t0 + Duration::from_secs(5));
        assert!(actions.contains(&ClientAction::OpenSocket { token: "tok-1".to_string() }));
    }

    #[test]
    fn disconnect_is_deliberate_and_idempotent() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let actions = client.disconnect();
        assert_eq!(sent_commands(&actions), vec![Command::Disconnect]);
        assert!(actions.contains(&ClientAction::CloseSocket));

        assert!(client.disconnect().is_empty());

        // No reconnect attempts follow a deliberate disconnect.
        assert!(client.tick(t0 + Duration::from_secs(600)).is_empty());

        // The selection survives for the next connect.
        assert_eq!(client.active_room(), Some(ROOM));
    }

    #[test]
    fn explicit_connect_skips_the_backoff_wait() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.transport_down("reset", t0);

        // Backoff would wait 5s, but the user asked now.
        let actions = client.connect(session(), t0 + Duration::from_secs(1));
        assert!(actions.contains(&ClientAction::OpenSocket { token: "tok-1".to_string() }));
        assert_eq!(client.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn clear_room_keeps_unsynced_sends() {
        let t0 = Instant::now();
        let mut client = ChatClient::new(ConnectionConfig::default());
        let _ = raise(&mut client, t0);
        let _ = client.set_active_room(ROOM, t0);

        let _ = client.history_loaded(ROOM, vec![live_message(1, ROOM, PEER)]);
        let actions = client.send_message(ROOM, "unsynced".to_string(), t0);
        let ClientAction::PostMessage { local_id, .. } = actions[0] else {
            panic!("expected a post, got {actions:?}");
        };
        let _ = client.send_failed(ROOM, local_id, "timeout");

        let _ = client.clear_room(ROOM);
        let records = client.messages(ROOM);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].delivery, Delivery::Failed);
    }
}
