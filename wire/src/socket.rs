//! Stream and datagram socket actors.
//!
//! Each socket is a split-pump actor: one task owns the OS handle for its
//! entire lifetime, draining a queue of outgoing frames before each read so
//! neither direction can starve the other. `INITIALIZATION` packets are
//! intercepted in the receive path and routed to `on_initialized`; every
//! other packet type is surfaced on `packet_received`. Callers talk to the
//! actor through a cloneable [`StreamHandle`] / datagram send method rather
//! than holding the socket directly.

use crate::codec::{decode_datagram, Frame, FrameDecoder};
use crate::error::ProtoError;
use crate::handshake::HandshakePayload;
use crate::message::{MessagePool, PacketType};
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use livewire_core::buffer::SegmentedBuffer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Sending half of a socket's `packet_received` stream (anything but
/// `INITIALIZATION`).
pub type PacketSender = flume::Sender<Frame>;
pub type PacketReceiver = flume::Receiver<Frame>;

/// Sending half of a socket's `on_initialized` stream.
pub type InitSender = flume::Sender<HandshakePayload>;
pub type InitReceiver = flume::Receiver<HandshakePayload>;

enum StreamCommand {
    Send(BytesMut),
    Close,
}

/// Handle to a running [`StreamSocket`] actor. Cheap to clone; every clone
/// feeds the same outgoing queue.
#[derive(Clone)]
pub struct StreamHandle {
    peer_addr: SocketAddr,
    cmd_tx: flume::Sender<StreamCommand>,
}

impl StreamHandle {
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queue a pre-encoded frame for sending. Returns an error only if the
    /// actor has already shut down. The buffer is released back to the
    /// actor's pool once the write completes.
    pub fn send(&self, bytes: BytesMut) -> crate::error::Result<()> {
        self.cmd_tx
            .send(StreamCommand::Send(bytes))
            .map_err(|_| ProtoError::PeerDisconnected)
    }

    pub fn close(&self) {
        let _ = self.cmd_tx.send(StreamCommand::Close);
    }
}

/// A reliable-channel (TCP) socket actor.
pub struct StreamSocket {
    stream: compio::net::TcpStream,
    peer_addr: SocketAddr,
    max_payload: usize,
    read_chunk: usize,
    packet_tx: PacketSender,
    init_tx: InitSender,
    cmd_rx: flume::Receiver<StreamCommand>,
    pool: MessagePool,
}

impl StreamSocket {
    #[must_use]
    pub fn new(
        stream: compio::net::TcpStream,
        peer_addr: SocketAddr,
        max_payload: usize,
        read_chunk: usize,
        pool: MessagePool,
    ) -> (Self, StreamHandle, PacketReceiver, InitReceiver) {
        let (packet_tx, packet_rx) = flume::unbounded();
        let (init_tx, init_rx) = flume::unbounded();
        let (cmd_tx, cmd_rx) = flume::unbounded();

        let handle = StreamHandle { peer_addr, cmd_tx };
        let actor = Self {
            stream,
            peer_addr,
            max_payload,
            read_chunk,
            packet_tx,
            init_tx,
            cmd_rx,
            pool,
        };
        (actor, handle, packet_rx, init_rx)
    }

    /// Run the read/write loop until the socket closes or errors. Consumes
    /// `self`: the actor owns the stream for its entire lifetime and is
    /// driven by a single spawned task.
    ///
    /// The pending read and the outgoing command queue are raced with
    /// `select_biased!` rather than drained-then-blocked-on: a queued write
    /// must flush as soon as it arrives, not only once the peer happens to
    /// send something back first (an idle reliable channel — heartbeats run
    /// over UDP — would otherwise starve every queued send and the graceful
    /// `DISCONNECT` notice alike).
    pub async fn run(self) {
        use compio::io::{AsyncReadExt, AsyncWriteExt};

        let mut decoder = FrameDecoder::new(self.max_payload);
        let mut recv = SegmentedBuffer::new();

        loop {
            let read_buf = match self.pool.acquire(self.read_chunk) {
                Ok(buf) => buf,
                Err(e) => {
                    warn!(peer = %self.peer_addr, error = %e, "failed to acquire read buffer");
                    return;
                }
            };

            futures::select_biased! {
                cmd = self.cmd_rx.recv_async() => {
                    match cmd {
                        Ok(StreamCommand::Send(bytes)) => {
                            if !self.write_one(bytes).await || !self.drain_queued_writes().await {
                                return;
                            }
                        }
                        Ok(StreamCommand::Close) | Err(_) => {
                            debug!(peer = %self.peer_addr, "stream socket closed locally");
                            return;
                        }
                    }
                    // The read buffer acquired for this iteration was never
                    // handed to a read future, so it's simply dropped here
                    // rather than released: compio's ownership-transfer I/O
                    // model gives no way to reclaim a buffer from a future
                    // that was never polled to completion.
                }
                read = self.stream.read(read_buf).fuse() => {
                    let (result, mut buf) = read;
                    let n = match result {
                        Ok(0) => {
                            debug!(peer = %self.peer_addr, "stream socket closed by peer");
                            return;
                        }
                        Ok(n) => n,
                        Err(e) if is_shutdown_class(&e) => {
                            debug!(peer = %self.peer_addr, error = %e, "stream socket shut down");
                            return;
                        }
                        Err(e) => {
                            warn!(peer = %self.peer_addr, error = %e, "stream socket read error");
                            return;
                        }
                    };

                    recv.push(Bytes::copy_from_slice(&buf[..n]));
                    buf.clear();
                    self.pool.release(buf);

                    loop {
                        match decoder.decode(&mut recv) {
                            Ok(Some(frame)) => self.dispatch(frame),
                            Ok(None) => break,
                            Err(e) => {
                                warn!(peer = %self.peer_addr, error = %e, "dropping malformed frame");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Write one already-encoded frame, releasing its buffer back to the
    /// pool once the write completes. Returns `false` if the socket should
    /// stop running.
    async fn write_one(&self, bytes: BytesMut) -> bool {
        use compio::io::AsyncWriteExt;
        let (result, mut buf) = self.stream.write_all(bytes).await;
        match result {
            Ok(()) => {
                buf.clear();
                self.pool.release(buf);
                true
            }
            Err(e) => {
                warn!(peer = %self.peer_addr, error = %e, "stream write error");
                false
            }
        }
    }

    /// Flush whatever else is already queued before returning to the read
    /// race, so a burst of queued sends doesn't each pay a full loop
    /// iteration.
    async fn drain_queued_writes(&self) -> bool {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                StreamCommand::Send(bytes) => {
                    if !self.write_one(bytes).await {
                        return false;
                    }
                }
                StreamCommand::Close => {
                    debug!(peer = %self.peer_addr, "stream socket closed locally");
                    return false;
                }
            }
        }
        true
    }

    fn dispatch(&self, frame: Frame) {
        if frame.packet_type == PacketType::Initialization {
            match HandshakePayload::decode_and_check(frame.payload) {
                Ok(payload) => {
                    let _ = self.init_tx.send(payload);
                }
                Err(e) => warn!(peer = %self.peer_addr, error = %e, "invalid handshake payload"),
            }
            return;
        }
        trace!(peer = %self.peer_addr, packet_type = ?frame.packet_type, "packet received");
        let _ = self.packet_tx.send(frame);
    }
}

/// An unreliable-channel (UDP) socket. On the server, a single datagram
/// socket is shared across every connection and marked `shared` so closing
/// one `Connection` doesn't tear it down for the others.
pub struct DatagramSocket {
    socket: Arc<compio::net::UdpSocket>,
    max_payload: usize,
    shared: bool,
}

impl DatagramSocket {
    #[must_use]
    pub fn new(socket: compio::net::UdpSocket, max_payload: usize) -> Self {
        Self {
            socket: Arc::new(socket),
            max_payload,
            shared: false,
        }
    }

    #[must_use]
    pub fn shared_handle(&self) -> Arc<compio::net::UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn mark_shared(&mut self) {
        self.shared = true;
    }

    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.shared
    }

    /// Send a pre-encoded frame to `dest`. Unreliable-channel sends are
    /// fire-and-forget: there is no retry or delivery confirmation.
    pub async fn send_to(&self, bytes: Bytes, dest: SocketAddr) -> crate::error::Result<()> {
        let (result, _) = self.socket.send_to(bytes, dest).await;
        result.map_err(ProtoError::Io)?;
        Ok(())
    }

    /// Decode one received datagram. Callers loop this against their own
    /// `recv_from`; unlike the stream socket, demultiplexing by sender
    /// address/id happens one layer up (in `Connection`/`Server`) since a
    /// shared datagram socket fans out to many connections.
    pub fn decode(&self, bytes: &[u8]) -> crate::error::Result<Frame> {
        decode_datagram(bytes, self.max_payload)
    }
}

fn is_shutdown_class(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
    )
}
