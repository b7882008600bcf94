//! Connection lifecycle management.
//!
//! Owns the STOMP session handshake, heart-beat exchange and the
//! reconnect schedule. This is a pure state machine: callers feed it
//! transport events and the current time, and it returns
//! [`ConnectionAction`]s for the caller to execute.
//!
//! # State machine
//!
//! ```text
//! ┌──────────────┐  dial   ┌────────────┐  CONNECTED   ┌───────────┐
//! │ Disconnected │────────>│ Connecting │─────────────>│ Connected │
//! └──────────────┘         └────────────┘              └───────────┘
//!        ▲                    │                            │
//!        │   socket lost, handshake rejected or timed out  │
//!        └────────────────────┴────────────────────────────┘
//!                   (retry scheduled with backoff)
//! ```
//!
//! An explicit [`Connection::shutdown`] also lands in `Disconnected`, but
//! without a scheduled retry.

use std::ops::Sub;
use std::time::{Duration, Instant};

use roomwire_proto::Frame;

/// Delay before the first reconnect attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for the exponential reconnect delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Time allowed for socket dial plus STOMP handshake before giving up.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Heart-beat offer sent in CONNECT, in milliseconds (send, want).
pub const DEFAULT_HEARTBEAT: (u32, u32) = (10_000, 10_000);

/// Multiple of the negotiated incoming interval tolerated before the
/// transport is declared dead.
const LIVENESS_GRACE: u32 = 2;

/// Lifecycle states of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no handshake in progress.
    Disconnected,
    /// Socket dialing or STOMP handshake in flight.
    Connecting,
    /// Handshake complete; frames flow.
    Connected,
}

/// Effects the connection asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open the WebSocket.
    Dial,
    /// Write a frame to the socket.
    SendFrame(Frame),
    /// Write a bare heart-beat EOL to the socket.
    SendHeartbeat,
    /// Close the socket.
    Close {
        /// Reason for closing, for diagnostics.
        reason: String,
    },
}

/// Tunable connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Virtual host announced in the CONNECT frame.
    pub host: String,
    /// Heart-beat offer in milliseconds: what we can send, what we want
    /// to receive. `0` on either side disables that direction.
    pub heartbeat: (u32, u32),
    /// Base reconnect delay; doubles per consecutive failure.
    pub retry_delay: Duration,
    /// Cap for the reconnect delay.
    pub max_retry_delay: Duration,
    /// Budget for socket dial plus handshake before rescheduling.
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            heartbeat: DEFAULT_HEARTBEAT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// STOMP session lifecycle state machine.
///
/// Generic over the instant type `I` so tests can drive time explicitly;
/// production use defaults to [`Instant`].
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    state: ConnectionState,
    /// Consecutive failures since the last completed handshake.
    failures: u32,
    /// When the current retry wait began, if one is scheduled.
    retry_started: Option<I>,
    /// When dialing began, if a connect attempt is in flight.
    connecting_since: Option<I>,
    /// Negotiated outgoing heart-beat interval.
    send_every: Option<Duration>,
    /// Negotiated incoming heart-beat interval.
    expect_every: Option<Duration>,
    last_sent: Option<I>,
    last_received: Option<I>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates a disconnected connection.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            failures: 0,
            retry_started: None,
            connecting_since: None,
            send_every: None,
            expect_every: None,
            last_sent: None,
            last_received: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` once the STOMP handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Delay before the next reconnect attempt at the current failure
    /// count: `retry_delay * 2^(failures - 1)`, capped at
    /// `max_retry_delay`.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        let doublings = self.failures.saturating_sub(1);
        self.config
            .retry_delay
            .saturating_mul(2u32.saturating_pow(doublings))
            .min(self.config.max_retry_delay)
    }

    /// Begins dialing. No-op unless disconnected; a scheduled retry is
    /// replaced by the immediate attempt.
    pub fn dial(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }
        tracing::info!(attempt = self.failures + 1, "dialing chat endpoint");
        self.state = ConnectionState::Connecting;
        self.retry_started = None;
        self.connecting_since = Some(now);
        vec![ConnectionAction::Dial]
    }

    /// The socket is open: start the STOMP handshake.
    pub fn transport_up(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            // A dial raced a shutdown; this socket is unwanted.
            return vec![ConnectionAction::Close {
                reason: "socket opened while not connecting".to_string(),
            }];
        }
        self.last_sent = Some(now);
        self.last_received = Some(now);
        vec![ConnectionAction::SendFrame(Frame::connect(
            &self.config.host,
            self.config.heartbeat,
        ))]
    }

    /// The socket closed or failed. Schedules a reconnect unless the
    /// connection was already lowered deliberately.
    pub fn transport_down(&mut self, now: I) {
        if self.state == ConnectionState::Disconnected {
            // Shutdown or a timeout already handled this socket.
            return;
        }
        tracing::warn!(failures = self.failures + 1, "transport lost");
        self.fail_and_schedule(now);
    }

    /// The server rejected the handshake with an ERROR frame.
    pub fn handshake_failed(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.fail_and_schedule(now);
        vec![ConnectionAction::Close {
            reason: "handshake rejected".to_string(),
        }]
    }

    /// Handles the CONNECTED frame: completes the handshake and fixes the
    /// heart-beat schedule for both directions.
    pub fn handle_connected(&mut self, frame: &Frame, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            tracing::warn!(state = ?self.state, "unexpected CONNECTED frame ignored");
            return Vec::new();
        }
        let (server_send, server_want) = frame.heart_beat().unwrap_or((0, 0));
        let (our_send, our_want) = self.config.heartbeat;
        self.send_every = negotiate(our_send, server_want);
        self.expect_every = negotiate(server_send, our_want);
        self.state = ConnectionState::Connected;
        self.failures = 0;
        self.retry_started = None;
        self.connecting_since = None;
        self.last_sent = Some(now);
        self.last_received = Some(now);
        tracing::info!(
            version = frame.version().unwrap_or("?"),
            send_every = ?self.send_every,
            expect_every = ?self.expect_every,
            "session established"
        );
        Vec::new()
    }

    /// Lowers the connection deliberately: polite DISCONNECT if the
    /// session is up, socket close, no retry. Idempotent.
    pub fn shutdown(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        match self.state {
            ConnectionState::Connected => {
                actions.push(ConnectionAction::SendFrame(Frame::disconnect()));
                actions.push(ConnectionAction::Close {
                    reason: "client shutdown".to_string(),
                });
            },
            ConnectionState::Connecting => {
                actions.push(ConnectionAction::Close {
                    reason: "client shutdown".to_string(),
                });
            },
            ConnectionState::Disconnected => {},
        }
        if self.state != ConnectionState::Disconnected {
            tracing::info!("session lowered");
        }
        self.state = ConnectionState::Disconnected;
        self.failures = 0;
        self.retry_started = None;
        self.connecting_since = None;
        self.clear_heartbeats();
        actions
    }

    /// Records inbound traffic. Frames and bare heart-beats both count as
    /// proof of life.
    pub fn record_activity(&mut self, now: I) {
        if self.state != ConnectionState::Disconnected {
            self.last_received = Some(now);
        }
    }

    /// Records an outbound frame, deferring the next idle heart-beat.
    pub fn record_send(&mut self, now: I) {
        if self.state != ConnectionState::Disconnected {
            self.last_sent = Some(now);
        }
    }

    /// Periodic driver: retries due reconnects, enforces the handshake
    /// timeout, emits idle heart-beats and declares silent transports dead.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected => {
                if let Some(started) = self.retry_started {
                    if now - started >= self.retry_delay() {
                        self.retry_started = None;
                        return self.dial(now);
                    }
                }
                Vec::new()
            },
            ConnectionState::Connecting => {
                if let Some(since) = self.connecting_since {
                    if now - since > self.config.handshake_timeout {
                        tracing::warn!("handshake timed out");
                        self.fail_and_schedule(now);
                        return vec![ConnectionAction::Close {
                            reason: "handshake timeout".to_string(),
                        }];
                    }
                }
                Vec::new()
            },
            ConnectionState::Connected => {
                if let (Some(expect), Some(last)) = (self.expect_every, self.last_received) {
                    if now - last > expect.saturating_mul(LIVENESS_GRACE) {
                        tracing::warn!(silent_for = ?(now - last), "heart-beat timeout");
                        self.fail_and_schedule(now);
                        return vec![ConnectionAction::Close {
                            reason: "heart-beat timeout".to_string(),
                        }];
                    }
                }
                if let (Some(every), Some(last)) = (self.send_every, self.last_sent) {
                    if now - last >= every {
                        self.last_sent = Some(now);
                        return vec![ConnectionAction::SendHeartbeat];
                    }
                }
                Vec::new()
            },
        }
    }

    fn fail_and_schedule(&mut self, now: I) {
        self.state = ConnectionState::Disconnected;
        self.failures = self.failures.saturating_add(1);
        self.retry_started = Some(now);
        self.connecting_since = None;
        self.clear_heartbeats();
        tracing::debug!(retry_in = ?self.retry_delay(), "reconnect scheduled");
    }

    fn clear_heartbeats(&mut self) {
        self.send_every = None;
        self.expect_every = None;
        self.last_sent = None;
        self.last_received = None;
    }
}

/// One direction of the STOMP heart-beat negotiation: the sender's
/// capability against the receiver's desire. Either side saying `0`
/// disables the direction; otherwise the slower of the two wins.
fn negotiate(can_send: u32, wants: u32) -> Option<Duration> {
    if can_send == 0 || wants == 0 {
        None
    } else {
        Some(Duration::from_millis(u64::from(can_send.max(wants))))
    }
}
