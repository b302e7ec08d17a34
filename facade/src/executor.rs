//! Foreground executor: decouples I/O threads from application callback
//! execution so handler dispatch happens on whatever thread/tick the
//! embedder considers "foreground" (a game engine's frame loop, a GUI's
//! event loop, or — in tests — the calling thread itself).

/// A boxed callback posted to the foreground executor.
pub type PostedFn = Box<dyn FnOnce() + Send + 'static>;

/// Runs application callbacks on the embedder's terms.
///
/// `NetworkEndpoint` never calls a registered message handler directly from
/// an I/O task; it always goes through `post` so handler execution is
/// ordered and never races the embedder's own frame state.
pub trait ForegroundExecutor: Send + Sync + 'static {
    fn post(&self, f: PostedFn);
}

/// Runs every posted callback immediately, on whatever thread called
/// `post`. Useful for deterministic integration tests where there's no
/// separate frame loop to drain a queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncExecutor;

impl ForegroundExecutor for SyncExecutor {
    fn post(&self, f: PostedFn) {
        f();
    }
}

/// Queues posted callbacks onto an MPSC channel drained by the embedder's
/// own tick via [`ChannelExecutor::drain`]. This is the executor a real
/// frame-loop-driven embedder uses: I/O tasks call `post`, and the
/// embedder calls `drain` once per frame to run whatever accumulated.
#[derive(Clone)]
pub struct ChannelExecutor {
    tx: flume::Sender<PostedFn>,
    rx: flume::Receiver<PostedFn>,
}

impl Default for ChannelExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelExecutor {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Run every callback queued since the last drain, in order.
    ///
    /// Returns the number of callbacks run.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while let Ok(f) = self.rx.try_recv() {
            f();
            n += 1;
        }
        n
    }
}

impl ForegroundExecutor for ChannelExecutor {
    fn post(&self, f: PostedFn) {
        // An unbounded channel never backs up on a dropped receiver in a
        // way that matters here: if nothing drains it, the embedder has
        // bigger problems than a queued callback leaking.
        let _ = self.tx.send(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn sync_executor_runs_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let executor = SyncExecutor;
        let ran2 = ran.clone();
        executor.post(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_executor_defers_until_drain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let executor = ChannelExecutor::new();
        let ran2 = ran.clone();
        executor.post(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(executor.drain(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
