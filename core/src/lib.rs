//! livewire-core
//!
//! Runtime-agnostic building blocks shared by the wire protocol and facade
//! crates:
//! - Pooled byte-buffer allocation (`buffer_pool`)
//! - A segmented receive buffer for reassembling stream frames (`buffer`)
//! - Socket option tuning (`socket`)
//! - Async read/write timeout helpers (`timeout`)
//! - Cancellation-safety guard for multi-step I/O (`poison`)
//! - 128-bit remote identity (`id`)
//! - Error types (`error`)
//! - Tunable configuration (`config`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod buffer_pool;
pub mod config;
pub mod error;
pub mod id;
pub mod poison;
pub mod socket;
pub mod timeout;

pub mod prelude {
    pub use crate::buffer::SegmentedBuffer;
    pub use crate::buffer_pool::BufferPool;
    pub use crate::config::NetworkConfig;
    pub use crate::error::{CoreError, Result};
    pub use crate::id::{RemoteId, REMOTE_ALL};
    pub use crate::poison::PoisonGuard;
}
