//! Pooled `BytesMut` allocation.
//!
//! Steady-state streaming acquires and disposes a buffer per frame; without
//! pooling that's an allocation on every read and write. `BufferPool` keeps a
//! thread-safe free list per size bucket (next power-of-two of the sizes
//! actually requested) and hands back a cleared, capacity-matching buffer
//! instead of allocating fresh.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

fn bucket_for(size: usize) -> usize {
    size.max(1).next_power_of_two()
}

struct Inner {
    free: Mutex<HashMap<usize, Vec<BytesMut>>>,
    max_bucket: usize,
    max_free_per_bucket: usize,
}

/// A thread-safe free list of reusable byte buffers.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    /// Create a pool that refuses to service requests above `max_size` and
    /// retains at most `max_free_per_bucket` idle buffers per size bucket.
    #[must_use]
    pub fn new(max_size: usize, max_free_per_bucket: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(HashMap::new()),
                max_bucket: bucket_for(max_size),
                max_free_per_bucket,
            }),
        }
    }

    /// Acquire a buffer with at least `size` bytes of capacity, reused from
    /// the free list when available.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CoreError::BufferTooLarge`] if `size` exceeds
    /// the pool's configured maximum.
    pub fn acquire(&self, size: usize) -> crate::error::Result<BytesMut> {
        let bucket = bucket_for(size);
        if bucket > self.inner.max_bucket {
            return Err(crate::error::CoreError::BufferTooLarge {
                requested: size,
                max: self.inner.max_bucket,
            });
        }

        let mut free = self.inner.free.lock();
        if let Some(bufs) = free.get_mut(&bucket) {
            if let Some(mut buf) = bufs.pop() {
                buf.clear();
                return Ok(buf);
            }
        }
        Ok(BytesMut::with_capacity(bucket))
    }

    /// Return a buffer to the pool for reuse.
    ///
    /// Buffers larger than the pool's configured maximum bucket, or buckets
    /// already at capacity, are dropped instead of retained.
    pub fn release(&self, buf: BytesMut) {
        let bucket = bucket_for(buf.capacity());
        if bucket > self.inner.max_bucket {
            return;
        }
        let mut free = self.inner.free.lock();
        let bufs = free.entry(bucket).or_default();
        if bufs.len() < self.inner.max_free_per_bucket {
            bufs.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::new(65_536, 4);
        let buf = pool.acquire(1024).unwrap();
        let ptr = buf.as_ptr();
        pool.release(buf);

        let reused = pool.acquire(1024).unwrap();
        assert_eq!(reused.as_ptr(), ptr);
    }

    #[test]
    fn rejects_oversize_requests() {
        let pool = BufferPool::new(4096, 4);
        let err = pool.acquire(8192).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::BufferTooLarge { .. }
        ));
    }

    #[test]
    fn caps_retained_free_list_length() {
        let pool = BufferPool::new(4096, 1);
        pool.release(BytesMut::with_capacity(1024));
        pool.release(BytesMut::with_capacity(1024));
        let free = pool.inner.free.lock();
        assert_eq!(free.get(&1024).map(Vec::len), Some(1));
    }
}
