//! Command framing and telemetry layout for the PMU serial port.
//!
//! Every frame on the wire is:
//! - A 2-byte sync marker ("PM") for stream resynchronization
//! - A header byte carrying the 6-bit command id and the reliable flag
//! - A 1-byte payload length
//! - A CRC-16/CCITT trailer over header and payload
//!
//! The same crate owns the telemetry snapshot layout, so the firmware-side
//! builder and the bridge-side decoder cannot drift apart.

pub mod codec;
pub mod command;
pub mod crc;
pub mod error;
pub mod reader;
pub mod telemetry;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Delivery, Frame, FrameConfig, FrameParser, CRC_SIZE, HEADER_SIZE,
    MAX_FRAME_SIZE, MAX_PAYLOAD,
};
pub use crc::{crc16_ccitt, crc32, Crc16};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use telemetry::{
    decode_telemetry, decode_telemetry_with, ChannelValue, TelemetryLayout, TelemetryView,
};
pub use writer::FrameWriter;
