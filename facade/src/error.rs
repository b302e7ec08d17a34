//! Facade-level error type, wrapping the lower crates' errors.

use crate::handler::HandlerConflict;
use thiserror::Error;

/// Errors produced by the `livewire` public API.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error(transparent)]
    Core(#[from] livewire_core::error::CoreError),

    #[error(transparent)]
    Proto(#[from] livewire_proto::error::ProtoError),

    #[error(transparent)]
    HandlerConflict(#[from] HandlerConflict),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("cannot register a message handler: {0}")]
    InvalidHandlerTarget(String),

    #[error("client is already running")]
    AlreadyRunning,

    #[error("server bind failed: {0}")]
    BindFailed(#[source] std::io::Error),
}

/// Result type alias for `livewire` operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    /// Whether this reflects a closed/broken connection rather than a
    /// transient or programmer-error condition.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Proto(e) => e.is_connection_error(),
            _ => false,
        }
    }
}
