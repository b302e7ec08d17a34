//! Connection and socket lifecycle event monitoring.
//!
//! Independent of the handler-routed `message_received` path: this is pure
//! diagnostics, a stream an embedder can subscribe to without affecting
//! message dispatch.

use livewire_core::id::RemoteId;
use std::fmt;
use std::net::SocketAddr;

/// Socket- and connection-lifecycle events.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Stream socket bound and listening.
    Listening(SocketAddr),
    /// Bind operation failed.
    BindFailed { addr: SocketAddr, reason: String },
    /// Server accepted an incoming stream connection.
    Accepted(SocketAddr),
    /// Client connection attempt failed.
    ConnectFailed { addr: SocketAddr, reason: String },
    /// A remote completed the handshake and is now established.
    Connected(RemoteId),
    /// A remote's connection closed.
    Disconnected {
        remote: RemoteId,
        reason: DisconnectReason,
    },
}

/// Why a connection closed, surfaced alongside [`ConnectionEvent::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `Connection::close` was called explicitly.
    Graceful,
    /// The heartbeat watchdog tripped.
    Timeout,
    /// A socket I/O error tore down the connection.
    Error,
    /// A new handshake from the same remote replaced this connection.
    Reconnected,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening(addr) => write!(f, "listening on {addr}"),
            Self::BindFailed { addr, reason } => write!(f, "bind failed for {addr}: {reason}"),
            Self::Accepted(addr) => write!(f, "accepted connection from {addr}"),
            Self::ConnectFailed { addr, reason } => write!(f, "connect failed for {addr}: {reason}"),
            Self::Connected(id) => write!(f, "connected: {id}"),
            Self::Disconnected { remote, reason } => write!(f, "disconnected: {remote} ({reason:?})"),
        }
    }
}

/// Receiving half of a connection-event monitor stream.
pub type ConnectionMonitor = flume::Receiver<ConnectionEvent>;
/// Sending half, held by whatever emits the events.
pub type ConnectionEventSender = flume::Sender<ConnectionEvent>;

/// Create a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (ConnectionEventSender, ConnectionMonitor) {
    flume::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_channel_round_trips() {
        let (tx, rx) = create_monitor();
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        tx.send(ConnectionEvent::Listening(addr)).unwrap();
        let event = rx.recv().unwrap();
        assert!(matches!(event, ConnectionEvent::Listening(_)));
    }
}
