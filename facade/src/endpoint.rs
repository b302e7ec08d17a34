//! Shared base of `Client` and `Server`: the connection table, the handler
//! table, and lifecycle event dispatch.

use crate::error::{NetworkError, Result};
use crate::executor::ForegroundExecutor;
use crate::handler::{HandlerTable, MessageHandler};
use dashmap::DashMap;
use livewire_core::config::NetworkConfig;
use livewire_core::id::RemoteId;
use livewire_proto::codec;
use livewire_proto::connection::{CloseReason, Connection};
use livewire_proto::message::{Channel, Message, PacketType};
use livewire_proto::monitor::{ConnectionEvent, ConnectionEventSender, ConnectionMonitor};
use livewire_proto::remote::{Remote, RemoteRegistry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A lifecycle event covering the endpoint as a whole, distinct from the
/// lower-level [`ConnectionEvent`] stream.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started,
    Stopped,
    RemoteConnected(RemoteId),
    RemoteDisconnected(RemoteId, CloseReason),
}

type LifecycleSubscriber = Arc<dyn Fn(LifecycleEvent) + Send + Sync + 'static>;

/// Shared base embedded in both `Client` and `Server`.
pub struct NetworkEndpoint {
    pub(crate) registry: Arc<RemoteRegistry>,
    pub(crate) connections: DashMap<RemoteId, Arc<Connection>>,
    pub(crate) handlers: Arc<HandlerTable>,
    pub(crate) executor: Arc<dyn ForegroundExecutor>,
    pub(crate) config: NetworkConfig,
    pub(crate) monitor_tx: ConnectionEventSender,
    monitor_rx: ConnectionMonitor,
    lifecycle_subs: Mutex<Vec<LifecycleSubscriber>>,
    running: AtomicBool,
}

impl NetworkEndpoint {
    #[must_use]
    pub fn new(config: NetworkConfig, executor: Arc<dyn ForegroundExecutor>) -> Self {
        let (monitor_tx, monitor_rx) = livewire_proto::monitor::create_monitor();
        Self {
            registry: RemoteRegistry::new(),
            connections: DashMap::new(),
            handlers: Arc::new(HandlerTable::default()),
            executor,
            config,
            monitor_tx,
            monitor_rx,
            lifecycle_subs: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn monitor(&self) -> ConnectionMonitor {
        self.monitor_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn on_lifecycle_event(&self, subscriber: LifecycleSubscriber) {
        self.lifecycle_subs.lock().push(subscriber);
    }

    fn emit_lifecycle(&self, event: LifecycleEvent) {
        // Snapshot before invoking: a subscriber that registers another
        // subscriber, or that triggers another lifecycle event, must not
        // reenter this non-reentrant lock.
        let subs: Vec<_> = self.lifecycle_subs.lock().clone();
        for sub in subs {
            sub(event.clone());
        }
    }

    pub fn mark_started(&self) {
        self.running.store(true, Ordering::Release);
        self.emit_lifecycle(LifecycleEvent::Started);
    }

    /// Register a connection after a successful handshake, making it
    /// visible to `send_message`/`REMOTE_ALL` and emitting
    /// `RemoteConnected`. A connection already registered for this remote
    /// id is closed as `Reconnected` before the new one takes its place.
    pub fn register_connection(&self, remote: Remote, connection: Arc<Connection>) {
        self.registry.register(remote);
        if let Some((_, old)) = self.connections.remove(&remote.id) {
            old.close(CloseReason::Reconnected);
        }
        self.connections.insert(remote.id, connection);
        let _ = self.monitor_tx.send(ConnectionEvent::Connected(remote.id));
        self.emit_lifecycle(LifecycleEvent::RemoteConnected(remote.id));
    }

    pub fn remove_connection(&self, id: RemoteId, reason: CloseReason) {
        if let Some((_, connection)) = self.connections.remove(&id) {
            connection.close(reason);
        }
        self.handlers.unregister(id);
        self.registry.remove(id);
        self.emit_lifecycle(LifecycleEvent::RemoteDisconnected(id, reason));
    }

    /// Register a message handler for `remote`. Messages buffered before
    /// this call are drained immediately if `handle_buffered` is `true`;
    /// otherwise they're discarded, and only messages arriving after
    /// registration reach the handler.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidHandlerTarget`] if `remote` is
    /// [`livewire_core::id::REMOTE_ALL`] or names a remote with no
    /// connection currently registered, and
    /// [`NetworkError::HandlerConflict`] if a different handler is already
    /// registered for `remote`.
    pub fn register_message_handler(
        &self,
        remote: RemoteId,
        handler: MessageHandler,
        handle_buffered: bool,
    ) -> Result<()> {
        if remote.is_broadcast() {
            return Err(NetworkError::InvalidHandlerTarget(
                "cannot register a message handler for REMOTE_ALL".to_string(),
            ));
        }
        if !self.connections.contains_key(&remote) {
            return Err(NetworkError::InvalidHandlerTarget(format!(
                "remote {remote} has no registered connection"
            )));
        }
        self.handlers
            .register(remote, handler, handle_buffered, self.executor.as_ref())
            .map_err(NetworkError::from)
    }

    /// Route a received frame payload to its registered handler, or buffer
    /// it for a handler that hasn't subscribed yet.
    pub fn handle_message(&self, message: Message) {
        self.handlers.handle(message.sender, message, self.executor.as_ref());
    }

    /// Send a message to `remote`, or to every currently connected remote
    /// if `remote` is [`REMOTE_ALL`].
    ///
    /// # Errors
    ///
    /// Returns an error if `remote` names a single, unknown remote. A
    /// `REMOTE_ALL` broadcast with zero connected remotes succeeds
    /// trivially (there is simply nothing to send to).
    pub async fn send_message(&self, remote: RemoteId, payload: &[u8], channel: Channel) -> Result<()> {
        if remote.is_broadcast() {
            let targets: Vec<_> = self.connections.iter().map(|e| e.value().clone()).collect();
            for connection in targets {
                if let Err(e) = connection.send(PacketType::Generic, payload, channel).await {
                    debug!(remote = %connection.id, error = %e, "broadcast send failed for one remote");
                }
            }
            return Ok(());
        }

        let connection = self
            .connections
            .get(&remote)
            .map(|e| e.value().clone())
            .ok_or(NetworkError::Proto(livewire_proto::error::ProtoError::PeerDisconnected))?;
        connection.send(PacketType::Generic, payload, channel).await?;
        Ok(())
    }

    /// Stop the endpoint, closing every connection.
    ///
    /// `graceful` selects whether peers are told via a `DISCONNECT` packet
    /// first (`Graceful`) or the sockets are simply torn down (`Error`).
    pub async fn stop(&self, graceful: bool) {
        self.running.store(false, Ordering::Release);

        let ids: Vec<RemoteId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, connection)) = self.connections.remove(&id) {
                if graceful {
                    let _ = connection.send(PacketType::Disconnect, &[], Channel::Reliable).await;
                    connection.close(CloseReason::Graceful);
                } else {
                    connection.close(CloseReason::Error);
                }
            }
            self.handlers.unregister(id);
            self.registry.remove(id);
        }

        info!("endpoint stopped");
        self.emit_lifecycle(LifecycleEvent::Stopped);
    }

    /// Encode an `INITIALIZATION` payload for this endpoint's local remote
    /// data. Shared by `Client::connect` and `Server`'s per-accept
    /// handshake.
    #[must_use]
    pub fn encode_handshake(local: &livewire_proto::handshake::HandshakePayload) -> bytes::BytesMut {
        let payload = local.encode();
        let mut buf = bytes::BytesMut::new();
        // The handshake payload is itself framed like any other packet;
        // the caller supplies the sender id used in that outer frame.
        codec::encode(
            local.remote.id,
            PacketType::Initialization,
            &payload,
            &mut buf,
        );
        buf
    }
}
