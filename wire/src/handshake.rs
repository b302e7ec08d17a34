//! `INITIALIZATION` handshake payload.
//!
//! Layout: `VersionData` (4 × u32 LE: major, minor, build, revision),
//! `RemoteData` (16-byte big-endian remote id, then two serialized
//! endpoints — stream then datagram — each a 1-byte address family, 4-byte
//! big-endian IPv4 address, 2-byte big-endian port), then a reserved
//! length-prefixed UTF-8 "kind" tag (empty when unused).

use crate::error::{ProtoError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use livewire_core::id::RemoteId;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Protocol version this build speaks. A peer advertising a different
/// version fails the handshake outright; there is no negotiation.
pub const PROTOCOL_VERSION: VersionData = VersionData {
    major: 0,
    minor: 1,
    build: 1,
    revision: 0,
};

const ADDR_FAMILY_V4: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionData {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl VersionData {
    const WIRE_SIZE: usize = 16;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32_le(self.major);
        buf.put_u32_le(self.minor);
        buf.put_u32_le(self.build);
        buf.put_u32_le(self.revision);
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        if src.len() < Self::WIRE_SIZE {
            return Err(ProtoError::invalid_handshake("version data truncated"));
        }
        Ok(Self {
            major: src.get_u32_le(),
            minor: src.get_u32_le(),
            build: src.get_u32_le(),
            revision: src.get_u32_le(),
        })
    }
}

impl std::fmt::Display for VersionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

fn encode_endpoint(addr: SocketAddr, buf: &mut BytesMut) -> Result<()> {
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(ADDR_FAMILY_V4);
            buf.put_slice(&v4.ip().octets());
            buf.put_u16(v4.port());
            Ok(())
        }
        SocketAddr::V6(_) => Err(ProtoError::invalid_handshake(
            "IPv6 endpoints are not supported on the wire",
        )),
    }
}

fn decode_endpoint(src: &mut Bytes) -> Result<SocketAddr> {
    if src.len() < 7 {
        return Err(ProtoError::invalid_handshake("endpoint truncated"));
    }
    let family = src.get_u8();
    if family != ADDR_FAMILY_V4 {
        return Err(ProtoError::invalid_handshake("unsupported address family"));
    }
    let mut octets = [0u8; 4];
    src.copy_to_slice(&mut octets);
    let port = src.get_u16();
    Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
}

/// The addressing half of the handshake payload: this side's id and both
/// channel endpoints, plus an optional connect-kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteData {
    pub id: RemoteId,
    pub stream_addr: SocketAddr,
    pub datagram_addr: SocketAddr,
    /// Reserved extension field: the client's registered connect-handler
    /// kind, or empty when unused. Additive: a peer that never sets this
    /// is unaffected.
    pub kind: String,
}

impl RemoteData {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&self.id.to_be_bytes());
        encode_endpoint(self.stream_addr, buf)?;
        encode_endpoint(self.datagram_addr, buf)?;
        let kind_bytes = self.kind.as_bytes();
        buf.put_u16_le(kind_bytes.len() as u16);
        buf.put_slice(kind_bytes);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self> {
        if src.len() < 16 {
            return Err(ProtoError::invalid_handshake("remote id truncated"));
        }
        let mut id_bytes = [0u8; 16];
        src.copy_to_slice(&mut id_bytes);
        let id = RemoteId::from_be_bytes(id_bytes);

        let stream_addr = decode_endpoint(src)?;
        let datagram_addr = decode_endpoint(src)?;

        let kind = if src.len() >= 2 {
            let kind_len = src.get_u16_le() as usize;
            if src.len() < kind_len {
                return Err(ProtoError::invalid_handshake("kind tag truncated"));
            }
            let kind_bytes = src.split_to(kind_len);
            String::from_utf8(kind_bytes.to_vec())
                .map_err(|_| ProtoError::invalid_handshake("kind tag is not valid UTF-8"))?
        } else {
            // Older or minimal peers may omit the reserved tail entirely.
            String::new()
        };

        Ok(Self {
            id,
            stream_addr,
            datagram_addr,
            kind,
        })
    }
}

/// Full `INITIALIZATION` packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub version: VersionData,
    pub remote: RemoteData,
}

impl HandshakePayload {
    #[must_use]
    pub fn new(remote: RemoteData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            remote,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.version.encode(&mut buf);
        self.remote
            .encode(&mut buf)
            .expect("stream/datagram addrs are validated IPv4 before encoding");
        buf.freeze()
    }

    /// Decode a received `INITIALIZATION` payload and verify protocol
    /// version compatibility in the same step, since a version mismatch
    /// should refuse the handshake before any addressing info is trusted.
    pub fn decode_and_check(mut bytes: Bytes) -> Result<Self> {
        let version = VersionData::decode(&mut bytes)?;
        if version != PROTOCOL_VERSION {
            return Err(ProtoError::VersionMismatch {
                local: PROTOCOL_VERSION.to_string(),
                peer: version.to_string(),
            });
        }
        let remote = RemoteData::decode(&mut bytes)?;
        Ok(Self { version, remote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn round_trips_with_kind_tag() {
        let payload = HandshakePayload::new(RemoteData {
            id: RemoteId::generate(),
            stream_addr: addr(9000),
            datagram_addr: addr(9001),
            kind: "face-capture".to_string(),
        });

        let decoded = HandshakePayload::decode_and_check(payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_with_empty_kind_tag() {
        let payload = HandshakePayload::new(RemoteData {
            id: RemoteId::generate(),
            stream_addr: addr(9000),
            datagram_addr: addr(9001),
            kind: String::new(),
        });

        let decoded = HandshakePayload::decode_and_check(payload.encode()).unwrap();
        assert_eq!(decoded.remote.kind, "");
    }

    #[test]
    fn rejects_mismatched_version() {
        let mut buf = BytesMut::new();
        VersionData {
            major: 9,
            minor: 9,
            build: 9,
            revision: 9,
        }
        .encode(&mut buf);
        RemoteData {
            id: RemoteId::generate(),
            stream_addr: addr(1),
            datagram_addr: addr(2),
            kind: String::new(),
        }
        .encode(&mut buf)
        .unwrap();

        let err = HandshakePayload::decode_and_check(buf.freeze()).unwrap_err();
        assert!(matches!(err, ProtoError::VersionMismatch { .. }));
    }
}
