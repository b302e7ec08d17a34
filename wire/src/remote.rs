//! Remote identity registry.
//!
//! Every peer that completes a handshake is registered here under its
//! [`RemoteId`]. Registration is idempotent: re-registering an id already
//! present just returns the existing entry rather than erroring, since a
//! reconnect can race a stale disconnect notification.

use dashmap::DashMap;
use livewire_core::id::RemoteId;
use std::net::SocketAddr;
use std::sync::Arc;

/// A remote peer's address pair: one for the reliable channel, one for the
/// unreliable channel. In practice these share an IP and usually a port,
/// but are modelled separately since nothing guarantees that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remote {
    pub id: RemoteId,
    pub stream_addr: SocketAddr,
    pub datagram_addr: SocketAddr,
}

impl Remote {
    #[must_use]
    pub const fn new(id: RemoteId, stream_addr: SocketAddr, datagram_addr: SocketAddr) -> Self {
        Self {
            id,
            stream_addr,
            datagram_addr,
        }
    }
}

/// Process-wide table of known remotes, keyed by [`RemoteId`].
///
/// Shared via `Arc` rather than a global singleton so tests can run multiple
/// independent registries in the same process.
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    remotes: DashMap<RemoteId, Remote>,
}

impl RemoteRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `remote`, or return the existing entry if its id is already
    /// known. Idempotent by design: callers don't need to check `contains`
    /// first.
    pub fn register(&self, remote: Remote) -> Remote {
        *self.remotes.entry(remote.id).or_insert(remote)
    }

    #[must_use]
    pub fn get(&self, id: RemoteId) -> Option<Remote> {
        self.remotes.get(&id).map(|r| *r)
    }

    pub fn remove(&self, id: RemoteId) -> Option<Remote> {
        self.remotes.remove(&id).map(|(_, r)| r)
    }

    #[must_use]
    pub fn contains(&self, id: RemoteId) -> bool {
        self.remotes.contains_key(&id)
    }

    /// Snapshot of every currently registered remote, used to resolve a
    /// `REMOTE_ALL` broadcast.
    #[must_use]
    pub fn all(&self) -> Vec<Remote> {
        self.remotes.iter().map(|e| *e.value()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn register_is_idempotent() {
        let registry = RemoteRegistry::new();
        let id = RemoteId::generate();
        let first = registry.register(Remote::new(id, addr(1), addr(2)));
        let second = registry.register(Remote::new(id, addr(3), addr(4)));
        assert_eq!(first, second);
        assert_eq!(registry.get(id).unwrap().stream_addr, addr(1));
    }

    #[test]
    fn remove_then_get_returns_none() {
        let registry = RemoteRegistry::new();
        let id = RemoteId::generate();
        registry.register(Remote::new(id, addr(1), addr(2)));
        registry.remove(id);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn all_returns_every_registered_remote() {
        let registry = RemoteRegistry::new();
        let a = RemoteId::generate();
        let b = RemoteId::generate();
        registry.register(Remote::new(a, addr(1), addr(2)));
        registry.register(Remote::new(b, addr(3), addr(4)));
        assert_eq!(registry.all().len(), 2);
    }
}
