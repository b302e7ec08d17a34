//! Pooled message envelopes and packet typing.

use bytes::{Bytes, BytesMut};
use livewire_core::buffer_pool::BufferPool;
use livewire_core::id::RemoteId;

/// Wire-level packet type, carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    /// Never sent; a decoded value outside the known range collapses to this.
    Invalid = 0,
    /// Handshake payload: local version plus remote addressing info.
    Initialization = 1,
    /// Application payload, dispatched to the registered message handler.
    Generic = 2,
    /// Zero-payload liveness probe, sent over the unreliable channel.
    Heartbeat = 3,
    /// Graceful connection teardown notice.
    Disconnect = 4,
}

impl PacketType {
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Initialization,
            2 => Self::Generic,
            3 => Self::Heartbeat,
            4 => Self::Disconnect,
            _ => Self::Invalid,
        }
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Transport a message or handler registration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// TCP stream: ordered, reliable.
    Reliable,
    /// UDP datagram: unordered, best-effort.
    Unreliable,
}

/// A message sent or received on a connection.
///
/// The payload itself is a plain, already-frozen `Bytes` slice; the buffer it
/// was decoded from is released back to a [`MessagePool`] by the socket actor
/// that produced it, not by this struct or its `Drop` impl.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: RemoteId,
    pub packet_type: PacketType,
    pub channel: Channel,
    payload: Bytes,
}

impl Message {
    #[must_use]
    pub const fn new(sender: RemoteId, packet_type: PacketType, channel: Channel, payload: Bytes) -> Self {
        Self {
            sender,
            packet_type,
            channel,
            payload,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Pool of reusable [`BytesMut`] scratch buffers for building outgoing
/// messages and receiving incoming ones, backed by a [`BufferPool`].
///
/// Message shells themselves (the small `Message` struct) aren't worth
/// pooling separately; it's the payload allocation that matters under
/// steady-state streaming.
#[derive(Clone)]
pub struct MessagePool {
    buffers: BufferPool,
    release_threshold: usize,
}

impl MessagePool {
    #[must_use]
    pub fn new(max_size: usize, max_free_per_bucket: usize, release_threshold: usize) -> Self {
        Self {
            buffers: BufferPool::new(max_size, max_free_per_bucket),
            release_threshold,
        }
    }

    /// Acquire a scratch buffer with at least `size` bytes of capacity.
    ///
    /// # Errors
    ///
    /// Propagates [`livewire_core::error::CoreError::BufferTooLarge`].
    pub fn acquire(&self, size: usize) -> livewire_core::error::Result<BytesMut> {
        self.buffers.acquire(size)
    }

    /// Return a scratch buffer for reuse, unless it's grown past the
    /// large-message release threshold (oversized buffers are dropped
    /// rather than pinned in the free list indefinitely).
    pub fn release(&self, buf: BytesMut) {
        if buf.capacity() > self.release_threshold {
            return;
        }
        self.buffers.release(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_round_trips() {
        for pt in [
            PacketType::Initialization,
            PacketType::Generic,
            PacketType::Heartbeat,
            PacketType::Disconnect,
        ] {
            assert_eq!(PacketType::from_u32(pt.as_u32()), pt);
        }
    }

    #[test]
    fn unknown_packet_type_is_invalid() {
        assert_eq!(PacketType::from_u32(99), PacketType::Invalid);
    }

    #[test]
    fn oversized_release_is_dropped_not_pooled() {
        let pool = MessagePool::new(1 << 20, 4, 8192);
        let big = pool.acquire(16384).unwrap();
        pool.release(big);
        // A fresh 16KiB acquire should not reuse the released (oversized) buffer.
        let reacquired = pool.acquire(16384).unwrap();
        assert_eq!(reacquired.len(), 0);
    }
}
