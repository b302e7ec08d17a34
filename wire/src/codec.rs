//! Frame codec: the 24-byte header (16-byte sender id, 4-byte packet type,
//! 4-byte payload length, all little-endian except the big-endian id) plus
//! payload.
//!
//! Stateful decoder in the same shape as a length-prefixed multipart
//! decoder: a fast path when the whole frame has already arrived, a slow
//! path that reassembles a frame split across multiple reads.

use crate::error::{ProtoError, Result};
use bytes::{Buf, Bytes, BytesMut};
use livewire_core::buffer::SegmentedBuffer;
use livewire_core::id::RemoteId;

use crate::message::PacketType;

/// Fixed size of the frame header: 16 (sender id) + 4 (packet type) + 4 (data length).
pub const HEADER_SIZE: usize = 24;

/// A decoded wire frame, prior to being wrapped as a [`crate::message::Message`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub sender: RemoteId,
    pub packet_type: PacketType,
    pub payload: Bytes,
}

/// Encode a frame directly into `buf`, reusing its existing capacity.
pub fn encode(sender: RemoteId, packet_type: PacketType, payload: &[u8], buf: &mut BytesMut) {
    buf.reserve(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&sender.to_be_bytes());
    buf.extend_from_slice(&packet_type.as_u32().to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Stateful frame decoder for a length-prefixed stream transport.
///
/// Not used by the datagram transport, where each receive is already one
/// complete frame (or garbage, rejected outright).
pub struct FrameDecoder {
    pending_header: Option<(RemoteId, PacketType, usize)>,
    staging: BytesMut,
    max_payload: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            pending_header: None,
            staging: BytesMut::new(),
            max_payload,
        }
    }

    /// Decode a single frame from `src`.
    ///
    /// Returns `Ok(None)` when more data is needed, not an error.
    pub fn decode(&mut self, src: &mut SegmentedBuffer) -> Result<Option<Frame>> {
        if self.pending_header.is_none() {
            if src.len() < HEADER_SIZE {
                return Ok(None);
            }

            let mut hdr = [0u8; HEADER_SIZE];
            if !src.copy_prefix(HEADER_SIZE, &mut hdr) {
                return Ok(None);
            }

            let sender = RemoteId::from_be_bytes(hdr[0..16].try_into().unwrap());
            let packet_type = PacketType::from_u32(u32::from_le_bytes(hdr[16..20].try_into().unwrap()));
            let mut len_bytes = &hdr[20..24];
            let data_length = len_bytes.get_u32_le() as usize;

            if data_length > self.max_payload {
                return Err(ProtoError::MessageTooLarge {
                    size: data_length,
                    max: self.max_payload,
                });
            }

            src.advance(HEADER_SIZE);
            self.pending_header = Some((sender, packet_type, data_length));
            self.staging = BytesMut::with_capacity(data_length);
        }

        let (sender, packet_type, data_length) = self.pending_header.unwrap();
        let needed = data_length - self.staging.len();
        let take = needed.min(src.len());
        if take > 0 {
            if let Some(bytes) = src.take_bytes(take) {
                self.staging.extend_from_slice(&bytes);
            }
        }

        if self.staging.len() < data_length {
            return Ok(None);
        }

        let payload = self.staging.split().freeze();
        self.pending_header = None;

        Ok(Some(Frame {
            sender,
            packet_type,
            payload,
        }))
    }
}

/// Decode a single complete datagram (no reassembly: a datagram either
/// arrives whole or is discarded by the OS).
pub fn decode_datagram(bytes: &[u8], max_payload: usize) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtoError::invalid_frame("datagram shorter than header"));
    }

    let sender = RemoteId::from_be_bytes(bytes[0..16].try_into().unwrap());
    let packet_type = PacketType::from_u32(u32::from_le_bytes(bytes[16..20].try_into().unwrap()));
    let data_length = u32::from_le_bytes(bytes[20..24].try_into().unwrap()) as usize;

    if data_length > max_payload {
        return Err(ProtoError::MessageTooLarge {
            size: data_length,
            max: max_payload,
        });
    }
    if bytes.len() != HEADER_SIZE + data_length {
        return Err(ProtoError::invalid_frame("datagram length does not match header"));
    }

    Ok(Frame {
        sender,
        packet_type,
        payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_frame() {
        let id = RemoteId::generate();
        let mut buf = BytesMut::new();
        encode(id, PacketType::Generic, b"hello", &mut buf);

        let mut seg = SegmentedBuffer::new();
        seg.push(buf.freeze());

        let mut decoder = FrameDecoder::new(65536);
        let frame = decoder.decode(&mut seg).unwrap().unwrap();
        assert_eq!(frame.sender, id);
        assert_eq!(frame.packet_type, PacketType::Generic);
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[test]
    fn reassembles_a_frame_split_across_reads() {
        let id = RemoteId::generate();
        let mut buf = BytesMut::new();
        encode(id, PacketType::Heartbeat, b"0123456789", &mut buf);
        let whole = buf.freeze();

        let mut seg = SegmentedBuffer::new();
        let mut decoder = FrameDecoder::new(65536);

        seg.push(whole.slice(0..10));
        assert!(decoder.decode(&mut seg).unwrap().is_none());

        seg.push(whole.slice(10..whole.len()));
        let frame = decoder.decode(&mut seg).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"0123456789");
    }

    #[test]
    fn rejects_oversize_payload_length() {
        let id = RemoteId::generate();
        let mut buf = BytesMut::new();
        encode(id, PacketType::Generic, &[0u8; 100], &mut buf);

        let mut seg = SegmentedBuffer::new();
        seg.push(buf.freeze());

        let mut decoder = FrameDecoder::new(50);
        assert!(matches!(
            decoder.decode(&mut seg),
            Err(ProtoError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn decodes_a_complete_datagram() {
        let id = RemoteId::generate();
        let mut buf = BytesMut::new();
        encode(id, PacketType::Heartbeat, &[], &mut buf);
        let frame = decode_datagram(&buf, 65536).unwrap();
        assert_eq!(frame.sender, id);
        assert_eq!(frame.packet_type, PacketType::Heartbeat);
        assert!(frame.payload.is_empty());
    }
}
