/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with the "PM" sync marker.
    #[error("invalid frame sync (expected 0x50 0x4D \"PM\")")]
    InvalidSync,

    /// The command id does not fit in 6 bits.
    #[error("invalid command id 0x{0:02X} (max 0x3F)")]
    InvalidId(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The CRC trailer does not match header and payload.
    #[error("frame crc mismatch (stored 0x{stored:04X}, computed 0x{computed:04X})")]
    CrcMismatch { stored: u16, computed: u16 },

    /// A telemetry snapshot is shorter than its fixed portion.
    #[error("telemetry packet too short ({len} bytes, need {min})")]
    TelemetryTooShort { len: usize, min: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
