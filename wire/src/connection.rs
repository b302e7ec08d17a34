//! A single peer connection: one stream socket, a shared or owned
//! datagram socket, a heartbeat producer, and a heartbeat watchdog.

use crate::codec::Frame;
use crate::message::{Channel, Message, MessagePool, PacketType};
use crate::monitor::{ConnectionEvent, ConnectionEventSender};
use crate::socket::{DatagramSocket, PacketReceiver, StreamHandle};
use crate::codec;
use livewire_core::config::NetworkConfig;
use livewire_core::id::RemoteId;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Initializing = 0,
    Established = 1,
    Closed = 2,
}

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Graceful,
    Timeout,
    Error,
    Reconnected,
}

impl From<CloseReason> for crate::monitor::DisconnectReason {
    fn from(r: CloseReason) -> Self {
        match r {
            CloseReason::Graceful => Self::Graceful,
            CloseReason::Timeout => Self::Timeout,
            CloseReason::Error => Self::Error,
            CloseReason::Reconnected => Self::Reconnected,
        }
    }
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            0 => ConnectionState::Initializing,
            1 => ConnectionState::Established,
            _ => ConnectionState::Closed,
        }
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition to `Closed` unless already closed. Returns `true` the
    /// first time this succeeds, `false` on every subsequent call — the
    /// caller uses this to make close idempotent.
    fn close_once(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s == ConnectionState::Closed as u8 {
                    None
                } else {
                    Some(ConnectionState::Closed as u8)
                }
            })
            .is_ok()
    }
}

/// An established connection to a single remote.
pub struct Connection {
    pub id: RemoteId,
    state: Arc<StateCell>,
    stream: StreamHandle,
    datagram: Arc<compio::net::UdpSocket>,
    datagram_peer: SocketAddr,
    datagram_shared: bool,
    last_heartbeat: Arc<Mutex<Option<Instant>>>,
    config: NetworkConfig,
    monitor_tx: ConnectionEventSender,
    handler_tx: flume::Sender<Message>,
    message_pool: MessagePool,
    tasks: Mutex<Vec<compio::runtime::Task<()>>>,
}

impl Connection {
    /// Construct a connection from an already-handshaken stream socket and
    /// a datagram socket (owned or shared). Spawns the heartbeat producer,
    /// the heartbeat watchdog, and the dispatch loops for both channels.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RemoteId,
        stream: StreamHandle,
        stream_packets: PacketReceiver,
        datagram: Arc<compio::net::UdpSocket>,
        datagram_peer: SocketAddr,
        datagram_shared: bool,
        datagram_packets: flume::Receiver<Frame>,
        config: NetworkConfig,
        monitor_tx: ConnectionEventSender,
        handler_tx: flume::Sender<Message>,
        message_pool: MessagePool,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            id,
            state: Arc::new(StateCell::new(ConnectionState::Established)),
            stream,
            datagram,
            datagram_peer,
            datagram_shared,
            last_heartbeat: Arc::new(Mutex::new(None)),
            config,
            monitor_tx,
            handler_tx,
            message_pool,
            tasks: Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::with_capacity(4);
        tasks.push(compio::runtime::spawn(conn.clone().run_heartbeat_producer()));
        tasks.push(compio::runtime::spawn(conn.clone().run_watchdog()));
        tasks.push(compio::runtime::spawn(
            conn.clone().run_dispatch(stream_packets, Channel::Reliable),
        ));
        tasks.push(compio::runtime::spawn(
            conn.clone().run_dispatch(datagram_packets, Channel::Unreliable),
        ));
        *conn.tasks.lock() = tasks;

        let _ = conn.monitor_tx.send(ConnectionEvent::Connected(id));
        conn
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Send a message over the requested channel.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ProtoError::PeerDisconnected`] if the
    /// connection is already closed.
    pub async fn send(&self, packet_type: PacketType, payload: &[u8], channel: Channel) -> crate::error::Result<()> {
        if self.state.get() == ConnectionState::Closed {
            return Err(crate::error::ProtoError::PeerDisconnected);
        }

        let mut buf = self.message_pool.acquire(codec::HEADER_SIZE + payload.len())?;
        codec::encode(self.id, packet_type, payload, &mut buf);

        match channel {
            Channel::Reliable => self.stream.send(buf),
            Channel::Unreliable => {
                let (result, mut returned) = self.datagram.send_to(buf, self.datagram_peer).await;
                returned.clear();
                self.message_pool.release(returned);
                result.map(|_| ()).map_err(crate::error::ProtoError::Io)
            }
        }
    }

    /// Feed a datagram addressed to this connection's remote into its
    /// heartbeat/dispatch path. Used by the server's shared-socket demux
    /// and the client's single-peer receive loop alike.
    pub fn note_incoming_heartbeat(&self) {
        *self.last_heartbeat.lock() = Some(Instant::now());
    }

    /// Close the connection. Idempotent: calling this more than once (e.g.
    /// once from the application and once from the watchdog racing it) only
    /// tears things down on the first call.
    pub fn close(&self, reason: CloseReason) {
        if !self.state.close_once() {
            return;
        }

        self.stream.close();
        if !self.datagram_shared {
            // An owned (non-shared) datagram socket has no other connection
            // relying on it, so nothing else needs to release it explicitly;
            // dropping the last `Arc` clone closes the underlying fd.
        }

        for task in self.tasks.lock().drain(..) {
            compio::runtime::spawn(async move {
                task.cancel().await;
            })
            .detach();
        }

        let _ = self.monitor_tx.send(ConnectionEvent::Disconnected {
            remote: self.id,
            reason: reason.into(),
        });
    }

    async fn run_heartbeat_producer(self: Arc<Self>) {
        loop {
            compio::time::sleep(self.config.heartbeat_period).await;
            if self.state.get() == ConnectionState::Closed {
                return;
            }
            if let Err(e) = self.send(PacketType::Heartbeat, &[], Channel::Unreliable).await {
                warn!(remote = %self.id, error = %e, "failed to send heartbeat");
            }
        }
    }

    async fn run_watchdog(self: Arc<Self>) {
        let window = self.config.disconnect_window();
        loop {
            compio::time::sleep(self.config.heartbeat_check_period).await;
            if self.state.get() == ConnectionState::Closed {
                return;
            }

            let mut last = self.last_heartbeat.lock();
            let Some(seen) = *last else {
                // First tick: seed the baseline now rather than at
                // construction time, since construction-time timestamps
                // have been unreliable on at least one host platform.
                *last = Some(Instant::now());
                continue;
            };
            drop(last);

            if seen.elapsed() > window {
                debug!(remote = %self.id, ?window, "heartbeat watchdog tripped");
                self.close(CloseReason::Timeout);
                return;
            }
        }
    }

    async fn run_dispatch(self: Arc<Self>, packets: flume::Receiver<Frame>, channel: Channel) {
        while let Ok(frame) = packets.recv_async().await {
            if self.state.get() == ConnectionState::Closed {
                return;
            }

            match frame.packet_type {
                PacketType::Heartbeat => self.note_incoming_heartbeat(),
                PacketType::Disconnect => {
                    self.close(CloseReason::Graceful);
                    return;
                }
                PacketType::Generic => {
                    let message = Message::new(frame.sender, frame.packet_type, channel, frame.payload);
                    if self.handler_tx.send(message).is_err() {
                        return;
                    }
                }
                PacketType::Initialization | PacketType::Invalid => {
                    warn!(remote = %self.id, packet_type = ?frame.packet_type, "unexpected packet type post-handshake");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cell_close_is_idempotent() {
        let cell = StateCell::new(ConnectionState::Established);
        assert!(cell.close_once());
        assert!(!cell.close_once());
        assert_eq!(cell.get(), ConnectionState::Closed);
    }
}
