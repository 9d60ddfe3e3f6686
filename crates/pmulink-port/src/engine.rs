//! Seam between the port and the frame-transport engine.
//!
//! The engine owns wire framing and, for reliable frames, retransmission.
//! The port only feeds it bytes and asks it to encode replies into the
//! arbiter's batch.

use bytes::BytesMut;
use pmulink_frame::{encode_frame, Delivery, Frame, FrameParser, MAX_FRAME_SIZE};

use crate::error::{PortError, Result};

/// Destination for encoded frame bytes.
pub trait TxSink {
    fn append_byte(&mut self, byte: u8);

    /// Bytes that can still be appended to the current frame.
    fn space_remaining(&self) -> usize;
}

/// Frame-transport engine driven by the port.
pub trait FrameEngine {
    /// Feed one received byte. Returns a frame when the byte completes one.
    fn poll(&mut self, byte: u8) -> Option<Frame>;

    /// A further frame that is already complete in the engine's buffer.
    /// The port calls this after every frame until it returns `None`.
    fn next_frame(&mut self) -> Option<Frame> {
        None
    }

    /// Encode a frame into `sink`. Must check `space_remaining()` first and
    /// fail rather than write a truncated frame.
    fn encode<S: TxSink>(
        &mut self,
        id: u8,
        delivery: Delivery,
        payload: &[u8],
        sink: &mut S,
    ) -> Result<()>;

    /// Periodic housekeeping. Returns a frame that is due for retransmission.
    fn housekeeping(&mut self, _now_ms: u32) -> Option<Frame> {
        None
    }
}

/// Stateless engine: sync/length/CRC framing, no retransmission.
#[derive(Debug)]
pub struct BasicEngine {
    parser: FrameParser,
    scratch: BytesMut,
}

impl BasicEngine {
    pub fn new() -> Self {
        Self {
            parser: FrameParser::new(),
            scratch: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Bytes discarded while resynchronizing on the receive side.
    pub fn discarded(&self) -> u64 {
        self.parser.discarded()
    }
}

impl Default for BasicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEngine for BasicEngine {
    fn poll(&mut self, byte: u8) -> Option<Frame> {
        self.parser.push(byte)
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.parser.next_frame()
    }

    fn encode<S: TxSink>(
        &mut self,
        id: u8,
        delivery: Delivery,
        payload: &[u8],
        sink: &mut S,
    ) -> Result<()> {
        self.scratch.clear();
        encode_frame(id, delivery, payload, &mut self.scratch)?;

        let available = sink.space_remaining();
        if self.scratch.len() > available {
            return Err(PortError::BatchOverflow {
                needed: self.scratch.len(),
                available,
            });
        }

        for &byte in self.scratch.iter() {
            sink.append_byte(byte);
        }
        Ok(())
    }
}
