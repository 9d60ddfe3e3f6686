//! Reply frames sent by the dispatcher.

use pmulink_frame::command::{
    ACK, BINARY_ACK, CAPABILITIES, CLEAR_CONFIG_ACK, CONFIG_DATA, FLASH_ACK, NACK,
    NACK_UNKNOWN_COMMAND, OUTPUT_ACK, PONG,
};
use pmulink_frame::Frame;

use crate::config::DeviceInfo;

/// Largest blob slice carried by one ConfigData frame.
pub const CONFIG_CHUNK_SIZE: usize = 251;

/// BinaryAck status: chunk arrived out of sequence.
pub const BINARY_OUT_OF_SEQUENCE: u8 = 0x01;

/// Pong.
pub fn pong() -> Frame {
    Frame::new(PONG, Vec::new())
}

/// ACK echoing the request id.
pub fn ack(request: u8) -> Frame {
    Frame::reliable(ACK, vec![request])
}

/// NACK `[request][reason]`.
pub fn nack(request: u8, reason: u8) -> Frame {
    Frame::reliable(NACK, vec![request, reason])
}

pub fn unknown_command(request: u8) -> Frame {
    nack(request, NACK_UNKNOWN_COMMAND)
}

pub fn flash_ack(ok: bool) -> Frame {
    Frame::reliable(FLASH_ACK, vec![u8::from(ok)])
}

pub fn clear_config_ack(ok: bool) -> Frame {
    Frame::reliable(CLEAR_CONFIG_ACK, vec![u8::from(ok)])
}

pub fn output_ack(channel: u8, state: u8) -> Frame {
    Frame::reliable(OUTPUT_ACK, vec![channel, state])
}

/// BinaryAck for an accepted chunk. `channels` is nonzero only once the
/// final chunk has been handed to the executor.
pub fn binary_ack(channels: u16) -> Frame {
    let [lo, hi] = channels.to_le_bytes();
    Frame::new(BINARY_ACK, vec![1, 0, lo, hi])
}

pub fn binary_rejected(status: u8) -> Frame {
    Frame::new(BINARY_ACK, vec![0, status, 0, 0])
}

/// One ConfigData chunk: `[chunk_idx u16][total_chunks u16][data]`.
pub fn config_data(index: u16, total: u16, chunk: &[u8]) -> Frame {
    let mut payload = Vec::with_capacity(4 + chunk.len());
    payload.extend_from_slice(&index.to_le_bytes());
    payload.extend_from_slice(&total.to_le_bytes());
    payload.extend_from_slice(chunk);
    Frame::new(CONFIG_DATA, payload)
}

/// ConfigData when no configuration is held.
pub fn config_absent() -> Frame {
    Frame::new(CONFIG_DATA, vec![0, 0, 1, 0, 0, 0])
}

pub fn capabilities(device: &DeviceInfo) -> Frame {
    Frame::reliable(CAPABILITIES, device.capabilities_payload().to_vec())
}

/// Number of ConfigData frames needed for a blob of `len` bytes.
pub fn config_chunk_count(len: usize) -> u16 {
    len.div_ceil(CONFIG_CHUNK_SIZE).min(u16::MAX as usize) as u16
}
