//! # livewire
//!
//! A dual-channel (reliable + unreliable) networking substrate for
//! live-capture streaming, built on `io_uring` via `compio`.
//!
//! ## Architecture
//!
//! `livewire` is structured the way the underlying kernel is: clean
//! layering over a shared async runtime.
//!
//! - **`livewire-core`**: runtime-agnostic primitives — buffer pools,
//!   remote ids, socket option tuning, generic framing helpers.
//! - **`livewire-proto`**: the wire protocol — frame codec, handshake,
//!   socket actors, and the per-remote `Connection`.
//! - **`livewire`**: this crate — `Client`, `Server`, message handler
//!   dispatch, and the foreground-executor abstraction.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use livewire::{Client, NetworkConfig, SyncExecutor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::start("127.0.0.1:7000", NetworkConfig::default(), Arc::new(SyncExecutor))?;
//! # let server_remote = client.id(); // stand-in: the real id comes from a Connected event
//! client.endpoint().register_message_handler(server_remote, Arc::new(|msg| {
//!     println!("received {} bytes", msg.payload().len());
//! }), true)?;
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use livewire::{NetworkConfig, Server, SyncExecutor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::bind("127.0.0.1:7000", NetworkConfig::default(), Arc::new(SyncExecutor)).await?;
//! println!("listening on {}", server.local_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! `unsafe` code is isolated to `livewire-core::socket` (socket option
//! tuning via `socket2`). Every other layer is safe Rust.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)] // Runtime-agnostic design
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![deny(unsafe_code)]

pub use bytes::Bytes;

pub mod client;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod handler;
pub mod server;

/// Development helpers (benches/tests).
pub mod dev_tracing;

pub use client::{Client, ClientState};
pub use endpoint::{LifecycleEvent, NetworkEndpoint};
pub use error::{NetworkError, Result};
pub use executor::{ChannelExecutor, ForegroundExecutor, PostedFn, SyncExecutor};
pub use handler::{HandlerConflict, MessageHandler};
pub use server::Server;

pub use livewire_core::config::NetworkConfig;
pub use livewire_core::id::{RemoteId, REMOTE_ALL};
pub use livewire_proto::connection::CloseReason;
pub use livewire_proto::message::{Channel, Message, PacketType};
pub use livewire_proto::monitor::{ConnectionEvent, DisconnectReason};

/// Commonly used items, re-exported for a single `use livewire::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Channel, Client, ClientState, ForegroundExecutor, LifecycleEvent, Message, NetworkConfig,
        NetworkEndpoint, NetworkError, PacketType, RemoteId, Server, SyncExecutor, REMOTE_ALL,
    };
}
