//! Error types for the chat client.

use roomwire_proto::ProtocolError;
use thiserror::Error;

/// Failures the client surfaces through connection notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The server refused or aborted the STOMP handshake.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Server-reported reason, or a local description of the failure.
        reason: String,
    },

    /// A frame or event envelope violated the wire grammar.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The socket failed or closed underneath the session.
    #[error("transport error: {reason}")]
    Transport {
        /// Description of the socket failure.
        reason: String,
    },
}

impl ClientError {
    /// Returns `true` if reconnecting may clear the failure.
    ///
    /// Transport drops and handshake rejections are worth retrying on the
    /// backoff schedule; the server may come back and an expired token may
    /// be refreshed by the host. Protocol violations are not retried away:
    /// they indicate an incompatible peer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Handshake { .. } | Self::Transport { .. })
    }
}
