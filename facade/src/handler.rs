//! Per-remote message handler table with buffering for late subscribers.

use crate::executor::ForegroundExecutor;
use livewire_core::id::RemoteId;
use livewire_proto::message::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// A registered message handler. `Arc`-wrapped so re-registering the exact
/// same handler (the same `Arc` clone) can be distinguished from
/// registering a genuinely different one.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync + 'static>;

/// Maximum messages buffered per remote before late arrivals start
/// overwriting the oldest buffered entry.
const DEFAULT_MAX_BUFFERED_PER_REMOTE: usize = 256;

/// Error returned when a remote already has a different handler registered.
#[derive(Debug, thiserror::Error)]
#[error("remote {0} already has a different message handler registered")]
pub struct HandlerConflict(pub RemoteId);

struct Inner {
    handlers: HashMap<RemoteId, MessageHandler>,
    buffered: HashMap<RemoteId, VecDeque<Message>>,
}

/// Handler table shared by `Client`/`Server` via `NetworkEndpoint`.
pub struct HandlerTable {
    inner: Mutex<Inner>,
    max_buffered_per_remote: usize,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERED_PER_REMOTE)
    }
}

impl HandlerTable {
    #[must_use]
    pub fn new(max_buffered_per_remote: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                handlers: HashMap::new(),
                buffered: HashMap::new(),
            }),
            max_buffered_per_remote,
        }
    }

    /// Register `handler` for `remote`. A different handler already
    /// registered for the same remote is refused; re-registering the same
    /// `Arc` is a no-op. Messages buffered before this call are drained
    /// into the handler only if `handle_buffered` is `true`; otherwise they
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerConflict`] if a different handler is already
    /// registered for `remote`.
    pub fn register(
        &self,
        remote: RemoteId,
        handler: MessageHandler,
        handle_buffered: bool,
        executor: &dyn ForegroundExecutor,
    ) -> Result<(), HandlerConflict> {
        let buffered = {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.handlers.get(&remote) {
                if !Arc::ptr_eq(existing, &handler) {
                    return Err(HandlerConflict(remote));
                }
            } else {
                inner.handlers.insert(remote, handler.clone());
            }
            inner.buffered.remove(&remote)
        };

        if handle_buffered {
            if let Some(queue) = buffered {
                for message in queue {
                    let handler = handler.clone();
                    executor.post(Box::new(move || handler(message)));
                }
            }
        }
        Ok(())
    }

    pub fn unregister(&self, remote: RemoteId) {
        let mut inner = self.inner.lock();
        inner.handlers.remove(&remote);
        inner.buffered.remove(&remote);
    }

    /// Dispatch a message for `remote`: post it to a registered handler, or
    /// buffer it (dropping the oldest buffered entry on overflow) if no
    /// handler has subscribed yet.
    pub fn handle(&self, remote: RemoteId, message: Message, executor: &dyn ForegroundExecutor) {
        let mut inner = self.inner.lock();
        if let Some(handler) = inner.handlers.get(&remote).cloned() {
            drop(inner);
            executor.post(Box::new(move || handler(message)));
            return;
        }

        let queue = inner.buffered.entry(remote).or_default();
        if queue.len() >= self.max_buffered_per_remote {
            warn!(%remote, "buffered message queue full, dropping oldest");
            queue.pop_front();
        }
        queue.push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SyncExecutor;
    use livewire_proto::message::{Channel, PacketType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(remote: RemoteId) -> Message {
        Message::new(remote, PacketType::Generic, Channel::Reliable, bytes::Bytes::new())
    }

    #[test]
    fn buffers_until_handler_registers_then_drains() {
        let table = HandlerTable::default();
        let executor = SyncExecutor;
        let remote = RemoteId::generate();

        table.handle(remote, msg(remote), &executor);
        table.handle(remote, msg(remote), &executor);

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handler: MessageHandler = Arc::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        table.register(remote, handler, true, &executor).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn conflicting_handler_registration_is_refused() {
        let table = HandlerTable::default();
        let executor = SyncExecutor;
        let remote = RemoteId::generate();

        let a: MessageHandler = Arc::new(|_| {});
        let b: MessageHandler = Arc::new(|_| {});

        table.register(remote, a.clone(), true, &executor).unwrap();
        assert!(table.register(remote, b, true, &executor).is_err());
        // Re-registering the identical handler is fine.
        assert!(table.register(remote, a, true, &executor).is_ok());
    }

    #[test]
    fn handle_buffered_false_discards_backlog() {
        let table = HandlerTable::default();
        let executor = SyncExecutor;
        let remote = RemoteId::generate();

        table.handle(remote, msg(remote), &executor);
        table.handle(remote, msg(remote), &executor);

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handler: MessageHandler = Arc::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        table.register(remote, handler, false, &executor).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0, "buffered backlog must be discarded, not drained");
    }

    #[test]
    fn overflow_drops_oldest_buffered_message() {
        let table = HandlerTable::new(2);
        let executor = SyncExecutor;
        let remote = RemoteId::generate();

        for _ in 0..5 {
            table.handle(remote, msg(remote), &executor);
        }

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handler: MessageHandler = Arc::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        table.register(remote, handler, true, &executor).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
