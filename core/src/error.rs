//! Core error types.
//!
//! Covers failures that can occur below the wire protocol: buffer pool
//! exhaustion, socket option configuration, and raw I/O passthrough. The
//! protocol and facade crates each layer their own error enum on top of this
//! one via `#[from]`.

use std::io;
use thiserror::Error;

/// Errors produced by `livewire-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error from the underlying OS socket or stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A socket option could not be applied.
    #[error("failed to configure socket: {0}")]
    SocketConfig(String),

    /// A requested buffer exceeds the pool's maximum bucket size.
    #[error("requested buffer of {requested} bytes exceeds pool maximum of {max}")]
    BufferTooLarge { requested: usize, max: usize },
}

/// Result type alias for `livewire-core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether retrying the operation that produced this error is worthwhile.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
