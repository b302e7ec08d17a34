//! Server: a stream acceptor plus a single shared datagram socket on the
//! same port. Every accepted connection shares that one datagram socket;
//! incoming datagrams are demultiplexed to the right `Connection` by
//! sender id carried in the frame header.

use crate::endpoint::NetworkEndpoint;
use crate::error::{NetworkError, Result};
use crate::executor::ForegroundExecutor;
use dashmap::DashMap;
use livewire_core::config::NetworkConfig;
use livewire_core::id::RemoteId;
use livewire_core::socket as socket_opts;
use livewire_proto::codec;
use livewire_proto::connection::Connection;
use livewire_proto::handshake::{HandshakePayload, RemoteData};
use livewire_proto::message::MessagePool;
use livewire_proto::monitor::ConnectionEvent;
use livewire_proto::remote::Remote;
use livewire_proto::socket::StreamSocket;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ConnectHandlerFactory = Arc<dyn Fn(RemoteId) + Send + Sync + 'static>;

/// A running server: one TCP listener, one shared UDP socket.
pub struct Server {
    endpoint: Arc<NetworkEndpoint>,
    local_addr: SocketAddr,
    datagram_routes: Arc<DashMap<RemoteId, flume::Sender<codec::Frame>>>,
    connect_handlers: Arc<Mutex<std::collections::HashMap<String, ConnectHandlerFactory>>>,
    accept_task: Mutex<Option<compio::runtime::Task<()>>>,
    datagram_task: Mutex<Option<compio::runtime::Task<()>>>,
}

impl Server {
    /// Bind `addr` and start accepting connections. Returns once the
    /// listener and the shared datagram socket are both bound.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidAddress`] if `addr` fails to parse,
    /// or [`NetworkError::BindFailed`] if either socket fails to bind.
    pub async fn bind(
        addr: impl AsRef<str>,
        config: NetworkConfig,
        executor: Arc<dyn ForegroundExecutor>,
    ) -> Result<Arc<Self>> {
        let addr_str = addr.as_ref();
        let bind_addr: SocketAddr = addr_str
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let endpoint = Arc::new(NetworkEndpoint::new(config.clone(), executor));

        let listener = compio::net::TcpListener::bind(bind_addr).await.map_err(|e| {
            let _ = endpoint.monitor_tx.send(ConnectionEvent::BindFailed {
                addr: bind_addr,
                reason: e.to_string(),
            });
            NetworkError::BindFailed(e)
        })?;
        let local_addr = listener.local_addr().map_err(NetworkError::BindFailed)?;

        let datagram = compio::net::UdpSocket::bind(bind_addr).await.map_err(NetworkError::BindFailed)?;
        socket_opts::configure_datagram(&datagram, config.datagram_max + 24).map_err(NetworkError::BindFailed)?;
        let datagram = Arc::new(datagram);

        let _ = endpoint.monitor_tx.send(ConnectionEvent::Listening(local_addr));
        info!(addr = %local_addr, "server listening");
        endpoint.mark_started();

        let server = Arc::new(Self {
            endpoint,
            local_addr,
            datagram_routes: Arc::new(DashMap::new()),
            connect_handlers: Arc::new(Mutex::new(std::collections::HashMap::new())),
            accept_task: Mutex::new(None),
            datagram_task: Mutex::new(None),
        });

        let accept_server = Arc::clone(&server);
        let accept_datagram = Arc::clone(&datagram);
        let accept_task = compio::runtime::spawn(async move {
            accept_server.run_accept_loop(listener, accept_datagram).await;
        });
        *server.accept_task.lock() = Some(accept_task);

        let demux_server = Arc::clone(&server);
        let demux_task = compio::runtime::spawn(async move {
            demux_server.run_datagram_demux(datagram).await;
        });
        *server.datagram_task.lock() = Some(demux_task);

        Ok(server)
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn endpoint(&self) -> &Arc<NetworkEndpoint> {
        &self.endpoint
    }

    /// Register a factory invoked once per successful handshake whose
    /// `INITIALIZATION` payload carries `kind` in its reserved tag. Replaces
    /// attribute-driven auto-registration with an explicit call.
    pub fn register_connect_handler<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(RemoteId) + Send + Sync + 'static,
    {
        self.connect_handlers.lock().insert(kind.into(), Arc::new(factory));
    }

    /// Stop the listener and close every connection.
    pub async fn stop(&self, graceful: bool) {
        if let Some(task) = self.accept_task.lock().take() {
            task.cancel().await;
        }
        if let Some(task) = self.datagram_task.lock().take() {
            task.cancel().await;
        }
        self.endpoint.stop(graceful).await;
    }

    async fn run_accept_loop(self: Arc<Self>, listener: compio::net::TcpListener, datagram: Arc<compio::net::UdpSocket>) {
        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let _ = self.endpoint.monitor_tx.send(ConnectionEvent::Accepted(peer_addr));

            let this = Arc::clone(&self);
            let datagram = Arc::clone(&datagram);
            compio::runtime::spawn(async move {
                this.handshake_and_register(stream, peer_addr, datagram).await;
            })
            .detach();
        }
    }

    async fn handshake_and_register(
        self: Arc<Self>,
        stream: compio::net::TcpStream,
        peer_addr: SocketAddr,
        datagram: Arc<compio::net::UdpSocket>,
    ) {
        let config = self.endpoint.config().clone();

        if let Err(e) = socket_opts::configure_stream(&stream, config.reliable_send_timeout) {
            warn!(peer = %peer_addr, error = %e, "failed to configure accepted stream socket");
            return;
        }

        let message_pool = MessagePool::new(
            config.datagram_max + codec::HEADER_SIZE,
            32,
            config.large_message_release_threshold,
        );

        let (socket, stream_handle, packet_rx, init_rx) = StreamSocket::new(
            stream,
            peer_addr,
            config.datagram_max,
            config.read_buffer_size,
            message_pool.clone(),
        );
        compio::runtime::spawn(socket.run()).detach();

        let peer = match compio::time::timeout(config.connect_attempt_timeout, init_rx.recv_async()).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(_)) => {
                debug!(peer = %peer_addr, "stream closed before handshake completed");
                stream_handle.close();
                return;
            }
            Err(_) => {
                debug!(peer = %peer_addr, "handshake timed out or failed version check, closing stream");
                stream_handle.close();
                return;
            }
        };

        let local_id = RemoteId::generate();
        let local_datagram_addr = match datagram.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "failed to read shared datagram socket address");
                return;
            }
        };
        let local = HandshakePayload::new(RemoteData {
            id: local_id,
            stream_addr: peer_addr,
            datagram_addr: local_datagram_addr,
            kind: String::new(),
        });
        if stream_handle.send(NetworkEndpoint::encode_handshake(&local)).is_err() {
            return;
        }

        let (handler_tx, handler_rx) = flume::unbounded();
        let (datagram_tx, datagram_rx) = flume::unbounded();
        self.datagram_routes.insert(peer.remote.id, datagram_tx);

        let connection = Connection::new(
            peer.remote.id,
            stream_handle,
            packet_rx,
            Arc::clone(&datagram),
            peer.remote.datagram_addr,
            true,
            datagram_rx,
            config,
            self.endpoint.monitor_tx.clone(),
            handler_tx,
            message_pool,
        );

        let remote = Remote::new(peer.remote.id, peer_addr, peer.remote.datagram_addr);
        self.endpoint.register_connection(remote, connection);

        if !peer.remote.kind.is_empty() {
            let factory = self.connect_handlers.lock().get(&peer.remote.kind).cloned();
            if let Some(factory) = factory {
                factory(peer.remote.id);
            }
        }

        let dispatch_endpoint = Arc::clone(&self.endpoint);
        let routes = Arc::clone(&self.datagram_routes);
        let remote_id = peer.remote.id;
        compio::runtime::spawn(async move {
            while let Ok(message) = handler_rx.recv_async().await {
                dispatch_endpoint.handle_message(message);
            }
            routes.remove(&remote_id);
        })
        .detach();
    }

    async fn run_datagram_demux(self: Arc<Self>, socket: Arc<compio::net::UdpSocket>) {
        let max_payload = self.endpoint.config().datagram_max;
        let mut buf = vec![0u8; max_payload + 64];
        loop {
            let (result, returned_buf) = socket.recv_from(buf).await;
            buf = returned_buf;
            let n = match result {
                Ok((n, _peer)) => n,
                Err(e) => {
                    warn!(error = %e, "shared datagram socket receive error");
                    return;
                }
            };

            let frame = match codec::decode_datagram(&buf[..n], max_payload) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping malformed datagram");
                    continue;
                }
            };

            if let Some(route) = self.datagram_routes.get(&frame.sender) {
                let _ = route.send(frame);
            } else {
                debug!(sender = %frame.sender, "datagram from unregistered remote, dropping");
            }
        }
    }
}
