//! 128-bit remote identity.

use rand::RngCore;
use std::fmt;

/// Identity of a remote peer, carried in every wire frame's sender field.
///
/// Wraps a raw `u128` rather than passing the primitive around directly, so
/// the broadcast sentinel and routing semantics are checked at the API
/// boundary instead of by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteId(u128);

/// Sentinel identity meaning "every currently registered remote".
pub const REMOTE_ALL: RemoteId = RemoteId(0);

impl RemoteId {
    /// Generate a new random, non-broadcast identity.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let lo = u128::from(rng.next_u64());
            let hi = u128::from(rng.next_u64());
            let candidate = lo | (hi << 64);
            if candidate != 0 {
                return Self(candidate);
            }
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn into_raw(self) -> u128 {
        self.0
    }

    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        self.0 == REMOTE_ALL.0
    }

    /// Big-endian wire representation used in the frame header and handshake payload.
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "REMOTE_ALL")
        } else {
            write!(f, "{:032x}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_never_broadcast() {
        for _ in 0..1000 {
            assert!(!RemoteId::generate().is_broadcast());
        }
    }

    #[test]
    fn round_trips_through_wire_bytes() {
        let id = RemoteId::generate();
        assert_eq!(RemoteId::from_be_bytes(id.to_be_bytes()), id);
    }

    #[test]
    fn remote_all_is_broadcast() {
        assert!(REMOTE_ALL.is_broadcast());
        assert_eq!(REMOTE_ALL.into_raw(), 0);
    }
}
