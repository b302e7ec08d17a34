//! Wire protocol errors.

use std::io;
use thiserror::Error;

/// Errors produced while framing, decoding, or handshaking over the wire.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// Lower-level I/O or buffer-pool failure.
    #[error(transparent)]
    Core(#[from] livewire_core::error::CoreError),

    /// IO error from the underlying socket.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A frame's declared length exceeds the configured maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A frame header could not be parsed.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The handshake payload was malformed.
    #[error("invalid handshake payload: {0}")]
    InvalidHandshake(String),

    /// Peer's protocol version does not match ours.
    #[error("protocol version mismatch: local {local}, peer {peer}")]
    VersionMismatch { local: String, peer: String },

    /// No `INITIALIZATION` packet arrived within the handshake deadline.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The peer closed the socket.
    #[error("peer disconnected")]
    PeerDisconnected,
}

/// Result type alias for `livewire-proto` operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

impl ProtoError {
    #[must_use]
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    #[must_use]
    pub fn invalid_handshake(msg: impl Into<String>) -> Self {
        Self::InvalidHandshake(msg.into())
    }

    /// Whether this error reflects a closed/broken connection rather than a
    /// transient condition worth retrying.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::PeerDisconnected | Self::HandshakeTimeout(_) | Self::VersionMismatch { .. }
        )
    }
}
