//! WebSocket transport for production use.
//!
//! A thin pump between the socket and the sans-IO [`ChatClient`]: frames
//! go out through a channel, frames and heart-beats come back through
//! another, and every decoded unit is exactly what the state machine
//! consumes. Protocol decisions stay in the client; this module only
//! moves bytes.
//!
//! [`ChatClient`]: crate::ChatClient

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use roomwire_proto::{Decoded, Frame, HEARTBEAT};

/// Depth of the frame channels in each direction.
const CHANNEL_DEPTH: usize = 32;

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Dialing or the WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The established stream failed mid-session.
    #[error("stream error: {0}")]
    Stream(String),
    /// Inbound bytes violated STOMP framing.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Instructions the socket task accepts.
#[derive(Debug)]
pub enum Outbound {
    /// Encode and send a frame.
    Frame(Frame),
    /// Send a bare heart-beat EOL.
    Heartbeat,
    /// Send a WebSocket close and end the task.
    Close,
}

/// What the socket task reports back.
#[derive(Debug)]
pub enum SocketEvent {
    /// A STOMP frame arrived.
    Frame(Frame),
    /// A bare heart-beat arrived.
    Heartbeat,
    /// The socket ended. `error` is `None` for a clean close.
    Closed {
        /// The failure that ended the session, if it was not clean.
        error: Option<TransportError>,
    },
}

/// Handle to a live WebSocket session.
#[derive(Debug)]
pub struct Socket {
    /// Send side: frames and heart-beats for the server.
    pub outbound: mpsc::Sender<Outbound>,
    /// Receive side: decoded frames, heart-beats and the final close.
    pub events: mpsc::Receiver<SocketEvent>,
    abort_handle: tokio::task::AbortHandle,
}

impl Socket {
    /// Stops the socket task immediately, without a close handshake.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Dials `url` with `token` attached as the `token` query parameter.
///
/// Returns once the WebSocket handshake completes; the STOMP handshake is
/// the state machine's job. The socket task runs until the stream ends,
/// [`Outbound::Close`] is sent, or [`Socket::stop`] is called.
///
/// # Errors
///
/// [`TransportError::Connection`] if the dial or WebSocket handshake
/// fails.
pub async fn open(url: &str, token: &str) -> Result<Socket, TransportError> {
    let (stream, _response) = tokio_tungstenite::connect_async(session_url(url, token))
        .await
        .map_err(|e| TransportError::Connection(format!("websocket handshake failed: {e}")))?;
    tracing::debug!(url, "websocket established");

    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_DEPTH);
    let handle = tokio::spawn(run_socket(stream, outbound_rx, event_tx));

    Ok(Socket {
        outbound: outbound_tx,
        events: event_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// The connect URL with the bearer token percent-encoded into the query.
fn session_url(url: &str, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}token={}", urlencoding::encode(token))
}

async fn run_socket<S>(
    stream: WebSocketStream<S>,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<SocketEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut buffer = BytesMut::new();

    let error = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    let mut wire = Vec::new();
                    if let Err(e) = frame.encode(&mut wire) {
                        break Some(TransportError::Protocol(format!("encode failed: {e}")));
                    }
                    if let Err(e) = sink.send(Message::Binary(wire.into())).await {
                        break Some(TransportError::Stream(format!("send failed: {e}")));
                    }
                },
                Some(Outbound::Heartbeat) => {
                    let beat = Message::Binary(Bytes::from_static(HEARTBEAT));
                    if let Err(e) = sink.send(beat).await {
                        break Some(TransportError::Stream(format!("send failed: {e}")));
                    }
                },
                Some(Outbound::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                },
                // The client dropped its handle; the session is over.
                None => break None,
            },
            incoming = source.next() => match incoming {
                Some(Ok(message)) => {
                    let data: &[u8] = match &message {
                        Message::Text(text) => text.as_bytes(),
                        Message::Binary(data) => data,
                        // tungstenite answers pings on its own.
                        Message::Ping(_) | Message::Pong(_) => continue,
                        Message::Close(_) => break None,
                        Message::Frame(_) => continue,
                    };
                    buffer.extend_from_slice(data);
                    if let Err(e) = drain(&mut buffer, &events).await {
                        break Some(e);
                    }
                },
                Some(Err(e)) => break Some(TransportError::Stream(format!("receive failed: {e}"))),
                None => break None,
            },
        }
    };

    tracing::debug!(?error, "socket task ended");
    let _ = events.send(SocketEvent::Closed { error }).await;
}

/// Forwards every complete unit sitting in `buffer`.
async fn drain(
    buffer: &mut BytesMut,
    events: &mpsc::Sender<SocketEvent>,
) -> Result<(), TransportError> {
    loop {
        match Frame::decode(buffer) {
            Ok(Decoded::Frame { frame, consumed }) => {
                let _ = buffer.split_to(consumed);
                if events.send(SocketEvent::Frame(frame)).await.is_err() {
                    return Ok(());
                }
            },
            Ok(Decoded::Heartbeat { consumed }) => {
                let _ = buffer.split_to(consumed);
                if events.send(SocketEvent::Heartbeat).await.is_err() {
                    return Ok(());
                }
            },
            Ok(Decoded::Incomplete) => return Ok(()),
            Err(e) => return Err(TransportError::Protocol(format!("stomp decode failed: {e}"))),
        }
    }
}
