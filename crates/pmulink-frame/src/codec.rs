use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::command::MAX_ID;
use crate::crc::Crc16;
use crate::error::{FrameError, Result};

/// Frame header: sync (2) + id/flags (1) + length (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// CRC-16 trailer.
pub const CRC_SIZE: usize = 2;

/// Sync bytes: "PM" (0x50 0x4D).
pub const SYNC: [u8; 2] = [0x50, 0x4D];

/// Largest payload the 1-byte length field can describe.
pub const MAX_PAYLOAD: usize = 255;

/// Largest complete frame on the wire.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD + CRC_SIZE;

const ID_MASK: u8 = 0x3F;
const RELIABLE_FLAG: u8 = 0x80;

/// Whether the transport engine retries a frame until it is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Reliable,
    #[default]
    Unreliable,
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 6-bit command id.
    pub id: u8,
    /// Delivery class requested by the sender.
    pub delivery: Delivery,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create an unreliable frame.
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            delivery: Delivery::Unreliable,
            payload: payload.into(),
        }
    }

    /// Create a frame that the engine retries until acknowledged.
    pub fn reliable(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            delivery: Delivery::Reliable,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + crc).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CRC_SIZE
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────────┬─────────┬──────────────┬────────────┐
/// │ Sync (2B)  │ Header (1B)  │ Len (1B)│ Payload      │ CRC16 (2B) │
/// │ 0x50 0x4D  │ R.ID[5:0]    │         │ (Len bytes)  │ LE         │
/// └────────────┴──────────────┴─────────┴──────────────┴────────────┘
/// ```
/// `R` (bit 7) marks a reliable frame. The CRC covers header, length and
/// payload.
pub fn encode_frame(id: u8, delivery: Delivery, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if id > MAX_ID {
        return Err(FrameError::InvalidId(id));
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    let header = match delivery {
        Delivery::Reliable => id | RELIABLE_FLAG,
        Delivery::Unreliable => id,
    };
    let len = payload.len() as u8;

    let mut crc = Crc16::new();
    crc.update(&[header, len]);
    crc.update(payload);

    dst.reserve(HEADER_SIZE + payload.len() + CRC_SIZE);
    dst.put_slice(&SYNC);
    dst.put_u8(header);
    dst.put_u8(len);
    dst.put_slice(payload);
    dst.put_u16_le(crc.finish());
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On error nothing is
/// consumed; the caller decides whether to skip a byte and resynchronize.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if !src.is_empty() && src[0] != SYNC[0] {
        return Err(FrameError::InvalidSync);
    }
    if src.len() >= 2 && src[1] != SYNC[1] {
        return Err(FrameError::InvalidSync);
    }
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header = src[2];
    let payload_len = src[3] as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len + CRC_SIZE;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let body_end = HEADER_SIZE + payload_len;
    let stored = u16::from_le_bytes([src[body_end], src[body_end + 1]]);
    let mut crc = Crc16::new();
    crc.update(&src[2..body_end]);
    let computed = crc.finish();
    if stored != computed {
        return Err(FrameError::CrcMismatch { stored, computed });
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(CRC_SIZE);

    let delivery = if header & RELIABLE_FLAG != 0 {
        Delivery::Reliable
    } else {
        Delivery::Unreliable
    };

    Ok(Some(Frame {
        id: header & ID_MASK,
        delivery,
        payload,
    }))
}

/// Byte-at-a-time frame parser.
///
/// Garbage, truncated frames and CRC failures are skipped one byte at a time
/// until the next sync marker lines up.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
    discarded: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            discarded: 0,
        }
    }

    /// Feed one byte; returns the oldest frame this byte made available.
    ///
    /// A resync can leave more than one complete frame behind. Call
    /// [`next_frame`](FrameParser::next_frame) until it returns `None` to
    /// collect the rest without waiting for more input.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        self.buf.put_u8(byte);
        self.next_frame()
    }

    /// Feed several bytes, collecting every completed frame.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            self.buf.put_u8(byte);
            frames.extend(std::iter::from_fn(|| self.next_frame()));
        }
        frames
    }

    /// Bytes thrown away while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes held for a frame still in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Decode the next complete frame already buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match decode_frame(&mut self.buf, MAX_PAYLOAD) {
                Ok(frame) => return frame,
                Err(err) => {
                    debug!(error = %err, "dropping byte to resync");
                    self.buf.advance(1);
                    self.discarded += 1;
                }
            }
        }
    }
}

/// Configuration for host-side frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 255.
    pub max_payload_size: usize,
    /// Skip corrupt bytes instead of failing the read.
    pub resync: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            resync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{GET_CAPABILITIES, PING, SET_OUTPUT};

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(SET_OUTPUT, Delivery::Reliable, &[3, 1], &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 2 + CRC_SIZE);
        assert_eq!(&buf[..4], &[0x50, 0x4D, 0x80 | SET_OUTPUT, 2]);

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.id, SET_OUTPUT);
        assert_eq!(frame.delivery, Delivery::Reliable);
        assert_eq!(frame.payload.as_ref(), &[3, 1]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crc_covers_header_and_payload() {
        let mut buf = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, &[], &mut buf).unwrap();
        let crc = u16::from_le_bytes([buf[4], buf[5]]);
        assert_eq!(crc, crate::crc::crc16_ccitt(&[PING, 0]));
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x50, 0x4D, 0x01][..]);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_sync() {
        let mut buf = BytesMut::from(&[0x50, 0xFF][..]);
        let result = decode_frame(&mut buf, MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidSync)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_crc_mismatch() {
        let mut buf = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, b"abc", &mut buf).unwrap();
        buf[5] ^= 0xFF;
        let result = decode_frame(&mut buf, MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::CrcMismatch { .. })));
    }

    #[test]
    fn test_decode_payload_over_limit() {
        let mut buf = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, &[0u8; 32], &mut buf).unwrap();
        let result = decode_frame(&mut buf, 16);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 32, max: 16 })
        ));
    }

    #[test]
    fn test_encode_rejects_wide_id() {
        let mut buf = BytesMut::new();
        let result = encode_frame(0x40, Delivery::Unreliable, &[], &mut buf);
        assert!(matches!(result, Err(FrameError::InvalidId(0x40))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let mut buf = BytesMut::new();
        let result = encode_frame(PING, Delivery::Unreliable, &[0u8; 256], &mut buf);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(PING, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4 + CRC_SIZE);
    }

    #[test]
    fn parser_skips_leading_garbage() {
        let mut wire = BytesMut::new();
        wire.put_slice(&[0x00, 0x50, 0x13, 0xFF]);
        encode_frame(GET_CAPABILITIES, Delivery::Unreliable, &[], &mut wire).unwrap();

        let mut parser = FrameParser::new();
        let frames = parser.extend(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, GET_CAPABILITIES);
        assert_eq!(parser.discarded(), 4);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn parser_recovers_after_corrupt_frame() {
        let mut wire = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, b"xy", &mut wire).unwrap();
        let corrupt_at = HEADER_SIZE;
        wire[corrupt_at] ^= 0x55;
        encode_frame(SET_OUTPUT, Delivery::Unreliable, &[1, 1], &mut wire).unwrap();

        let mut parser = FrameParser::new();
        let frames = parser.extend(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, SET_OUTPUT);
    }

    #[test]
    fn parser_releases_every_frame_behind_bogus_header() {
        // Declares 10 payload bytes, swallowing both frames until the CRC fails.
        let mut wire = BytesMut::from(&[0x50, 0x4D, PING, 0x0A][..]);
        encode_frame(PING, Delivery::Unreliable, &[], &mut wire).unwrap();
        encode_frame(GET_CAPABILITIES, Delivery::Unreliable, &[], &mut wire).unwrap();

        let mut parser = FrameParser::new();
        let (last, head) = wire.split_last().unwrap();
        assert!(parser.extend(head).is_empty());

        let first = parser.push(*last).unwrap();
        assert_eq!(first.id, PING);
        let second = parser.next_frame().unwrap();
        assert_eq!(second.id, GET_CAPABILITIES);
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.buffered(), 0);
        assert_eq!(parser.discarded(), 4);
    }

    #[test]
    fn extend_collects_frames_released_by_resync() {
        let mut wire = BytesMut::from(&[0x50, 0x4D, PING, 0x0A][..]);
        encode_frame(PING, Delivery::Unreliable, &[], &mut wire).unwrap();
        encode_frame(PING, Delivery::Reliable, &[], &mut wire).unwrap();

        let frames = FrameParser::new().extend(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].delivery, Delivery::Reliable);
    }

    #[test]
    fn parser_yields_back_to_back_frames() {
        let mut wire = BytesMut::new();
        encode_frame(PING, Delivery::Unreliable, &[], &mut wire).unwrap();
        encode_frame(PING, Delivery::Reliable, &[9], &mut wire).unwrap();

        let mut parser = FrameParser::new();
        let frames = parser.extend(&wire);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].payload.as_ref(), &[9]);
        assert_eq!(parser.discarded(), 0);
    }
}
