//! livewire-proto
//!
//! The wire protocol layer: remote identity and registry (`remote`), pooled
//! message envelopes (`message`), the 24-byte frame codec (`codec`), the
//! `INITIALIZATION` handshake payload (`handshake`), stream/datagram socket
//! actors (`socket`), the established `Connection` (heartbeat + dispatch)
//! (`connection`), lifecycle event monitoring (`monitor`), and error types
//! (`error`).

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod monitor;
pub mod remote;
pub mod socket;

pub mod prelude {
    pub use crate::connection::{CloseReason, Connection, ConnectionState};
    pub use crate::error::{ProtoError, Result};
    pub use crate::handshake::{HandshakePayload, RemoteData, VersionData, PROTOCOL_VERSION};
    pub use crate::message::{Channel, Message, MessagePool, PacketType};
    pub use crate::monitor::{ConnectionEvent, DisconnectReason};
    pub use crate::remote::{Remote, RemoteRegistry};
    pub use crate::socket::{DatagramSocket, StreamHandle, StreamSocket};
}
