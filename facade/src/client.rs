//! Client: connects outward to a single server and keeps the connection
//! alive across transient disconnects.
//!
//! Reconnect states: `Stopped` → `Connecting` ↔ `Connected`. `Connecting`
//! moves to `Connected` on handshake completion; `Connected` moves back to
//! `Connecting` on a non-graceful close. Any state moves to `Stopped` on
//! explicit `stop()`. A graceful close (the server said goodbye) does not
//! trigger a reconnect.

use crate::endpoint::NetworkEndpoint;
use crate::error::{NetworkError, Result};
use crate::executor::ForegroundExecutor;
use livewire_core::config::NetworkConfig;
use livewire_core::id::RemoteId;
use livewire_core::socket as socket_opts;
use livewire_proto::codec;
use livewire_proto::connection::Connection;
use livewire_proto::error::ProtoError;
use livewire_proto::handshake::{HandshakePayload, RemoteData};
use livewire_proto::message::MessagePool;
use livewire_proto::monitor::{ConnectionEvent, DisconnectReason};
use livewire_proto::remote::Remote;
use livewire_proto::socket::StreamSocket;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Client-side reconnect state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Stopped = 0,
    Connecting = 1,
    Connected = 2,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(s: ClientState) -> Self {
        Self(AtomicU8::new(s as u8))
    }

    fn get(&self) -> ClientState {
        match self.0.load(Ordering::Acquire) {
            0 => ClientState::Stopped,
            1 => ClientState::Connecting,
            _ => ClientState::Connected,
        }
    }

    fn set(&self, s: ClientState) {
        self.0.store(s as u8, Ordering::Release);
    }
}

/// A client connection to a single server, with automatic reconnect.
pub struct Client {
    endpoint: Arc<NetworkEndpoint>,
    id: RemoteId,
    server_addr: SocketAddr,
    state: Arc<StateCell>,
    stop_tx: flume::Sender<()>,
    task: parking_lot::Mutex<Option<compio::runtime::Task<()>>>,
    /// Where the long-lived datagram receive loop hands decoded frames for
    /// the connection that's currently live. Replaced on each successful
    /// (re)connect rather than the socket itself: the local UDP port stays
    /// the same across reconnect attempts.
    datagram_route: Arc<parking_lot::Mutex<Option<flume::Sender<codec::Frame>>>>,
}

impl Client {
    /// Validate `server_addr` and start the connect/reconnect loop. Returns
    /// immediately; the loop runs in the background and drives `state()`
    /// through `Connecting`/`Connected` as attempts succeed and fail.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidAddress`] if `server_addr` fails to
    /// parse as a `host:port` pair.
    pub fn start(
        server_addr: impl AsRef<str>,
        config: NetworkConfig,
        executor: Arc<dyn ForegroundExecutor>,
    ) -> Result<Arc<Self>> {
        let addr_str = server_addr.as_ref();
        let server_addr: SocketAddr = addr_str
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let endpoint = Arc::new(NetworkEndpoint::new(config, executor));
        let id = RemoteId::generate();
        let state = Arc::new(StateCell::new(ClientState::Stopped));
        let (stop_tx, stop_rx) = flume::bounded(1);

        let client = Arc::new(Self {
            endpoint,
            id,
            server_addr,
            state,
            stop_tx,
            task: parking_lot::Mutex::new(None),
            datagram_route: Arc::new(parking_lot::Mutex::new(None)),
        });

        client.endpoint.mark_started();
        let driver = client.clone();
        let task = compio::runtime::spawn(async move { driver.run_loop(stop_rx).await });
        *client.task.lock() = Some(task);

        Ok(client)
    }

    #[must_use]
    pub fn id(&self) -> RemoteId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Arc<NetworkEndpoint> {
        &self.endpoint
    }

    /// Stop the client. Any in-flight connection attempt is abandoned and
    /// the current connection, if any, is closed gracefully.
    pub async fn stop(&self) {
        let _ = self.stop_tx.try_send(());
        self.endpoint.stop(true).await;
        self.state.set(ClientState::Stopped);
    }

    async fn run_loop(self: Arc<Self>, stop_rx: flume::Receiver<()>) {
        let config = self.endpoint.config().clone();

        let datagram = match self.bind_datagram(&config).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                warn!(server = %self.server_addr, error = %e, "failed to bind client datagram socket");
                self.state.set(ClientState::Stopped);
                return;
            }
        };
        // Bound once and reused across every reconnect attempt below, so the
        // recv loop driving it must also be long-lived rather than respawned
        // per attempt — two recv loops racing on the same socket would each
        // only see some of the incoming datagrams.
        compio::runtime::spawn(run_datagram_recv_loop(
            Arc::clone(&datagram),
            Arc::clone(&self.datagram_route),
            config.datagram_max,
        ))
        .detach();

        loop {
            if stop_rx.try_recv().is_ok() {
                break;
            }

            self.state.set(ClientState::Connecting);
            match self.connect_once(Arc::clone(&datagram)).await {
                Ok((remote, connection)) => {
                    self.state.set(ClientState::Connected);
                    self.endpoint.register_connection(remote, connection);
                    info!(remote = %remote.id, server = %self.server_addr, "connected");

                    let reason = self.wait_for_disconnect(remote.id, &stop_rx).await;
                    self.endpoint.handlers.unregister(remote.id);
                    self.endpoint.connections.remove(&remote.id);
                    *self.datagram_route.lock() = None;

                    match reason {
                        Some(DisconnectReason::Graceful) | None => break,
                        Some(_) => continue,
                    }
                }
                Err(e) => {
                    let _ = self.endpoint.monitor_tx.send(ConnectionEvent::ConnectFailed {
                        addr: self.server_addr,
                        reason: e.to_string(),
                    });
                    debug!(server = %self.server_addr, error = %e, "connect attempt failed, retrying");
                    compio::time::sleep(self.endpoint.config().connect_attempt_timeout).await;
                }
            }
        }

        self.state.set(ClientState::Stopped);
        self.endpoint.stop(false).await;
    }

    /// Bind the client's datagram socket and connect it to the server's
    /// address. The server always binds its shared UDP socket to the same
    /// address as its TCP listener, so this address is known upfront and
    /// doesn't require waiting on the handshake. Connecting the socket at
    /// the OS level makes it reject datagrams from any other sender.
    async fn bind_datagram(&self, config: &NetworkConfig) -> Result<compio::net::UdpSocket> {
        let datagram = compio::net::UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(NetworkError::BindFailed)?;
        socket_opts::configure_datagram(&datagram, config.datagram_max + 24).map_err(NetworkError::BindFailed)?;
        datagram.connect(self.server_addr).await.map_err(NetworkError::BindFailed)?;
        Ok(datagram)
    }

    async fn connect_once(&self, datagram: Arc<compio::net::UdpSocket>) -> Result<(Remote, Arc<Connection>)> {
        let config = self.endpoint.config().clone();

        let stream = compio::time::timeout(
            config.connect_attempt_timeout,
            compio::net::TcpStream::connect(self.server_addr),
        )
        .await
        .map_err(|_| NetworkError::Proto(ProtoError::HandshakeTimeout(config.connect_attempt_timeout)))?
        .map_err(NetworkError::BindFailed)?;

        socket_opts::configure_stream(&stream, config.reliable_send_timeout).map_err(NetworkError::BindFailed)?;
        let local_stream_addr = stream.local_addr().map_err(NetworkError::BindFailed)?;
        let local_datagram_addr = datagram.local_addr().map_err(NetworkError::BindFailed)?;

        let message_pool = MessagePool::new(
            config.datagram_max + codec::HEADER_SIZE,
            32,
            config.large_message_release_threshold,
        );

        let (socket, stream_handle, packet_rx, init_rx) = StreamSocket::new(
            stream,
            self.server_addr,
            config.datagram_max,
            config.read_buffer_size,
            message_pool.clone(),
        );
        compio::runtime::spawn(socket.run()).detach();

        let local = HandshakePayload::new(RemoteData {
            id: self.id,
            stream_addr: local_stream_addr,
            datagram_addr: local_datagram_addr,
            kind: String::new(),
        });
        stream_handle.send(NetworkEndpoint::encode_handshake(&local))?;

        let peer = match compio::time::timeout(config.connect_attempt_timeout, init_rx.recv_async()).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => {
                stream_handle.close();
                return Err(NetworkError::Proto(ProtoError::PeerDisconnected));
            }
            Err(_) => {
                stream_handle.close();
                return Err(NetworkError::Proto(ProtoError::HandshakeTimeout(config.connect_attempt_timeout)));
            }
        };

        let (handler_tx, handler_rx) = flume::unbounded();
        let (datagram_tx, datagram_rx) = flume::unbounded();
        *self.datagram_route.lock() = Some(datagram_tx);

        let connection = Connection::new(
            peer.remote.id,
            stream_handle,
            packet_rx,
            Arc::clone(&datagram),
            peer.remote.datagram_addr,
            true,
            datagram_rx,
            config.clone(),
            self.endpoint.monitor_tx.clone(),
            handler_tx,
            message_pool,
        );

        let dispatch_endpoint = Arc::clone(&self.endpoint);
        compio::runtime::spawn(async move {
            while let Ok(message) = handler_rx.recv_async().await {
                dispatch_endpoint.handle_message(message);
            }
        })
        .detach();

        let remote = Remote::new(peer.remote.id, peer.remote.stream_addr, peer.remote.datagram_addr);
        Ok((remote, connection))
    }

    async fn wait_for_disconnect(&self, remote_id: RemoteId, stop_rx: &flume::Receiver<()>) -> Option<DisconnectReason> {
        let monitor = self.endpoint.monitor();
        loop {
            futures::select_biased! {
                _ = stop_rx.recv_async() => return None,
                event = monitor.recv_async() => {
                    match event {
                        Ok(ConnectionEvent::Disconnected { remote, reason }) if remote == remote_id => {
                            return Some(reason);
                        }
                        Ok(_) => continue,
                        Err(_) => return None,
                    }
                }
            }
        }
    }
}

/// Feed datagrams arriving on this client's own UDP socket into whichever
/// connection is currently live, looked up fresh from `route` on every
/// received datagram since the socket outlives any single connection.
async fn run_datagram_recv_loop(
    socket: Arc<compio::net::UdpSocket>,
    route: Arc<parking_lot::Mutex<Option<flume::Sender<codec::Frame>>>>,
    max_payload: usize,
) {
    let mut buf = vec![0u8; max_payload + 64];
    loop {
        let (result, returned_buf) = socket.recv_from(buf).await;
        buf = returned_buf;
        let n = match result {
            Ok((n, _peer)) => n,
            Err(e) => {
                warn!(error = %e, "datagram receive error, stopping recv loop");
                return;
            }
        };

        match codec::decode_datagram(&buf[..n], max_payload) {
            Ok(frame) => {
                if let Some(tx) = route.lock().clone() {
                    let _ = tx.send(frame);
                }
            }
            Err(e) => warn!(error = %e, "dropping malformed datagram"),
        }
    }
}
