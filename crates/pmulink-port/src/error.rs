/// Errors that can occur in port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// A frame is already being collected or transmitted.
    #[error("transmit already in progress")]
    Busy,

    /// The encoded frame does not fit in the remaining batch space.
    #[error("frame needs {needed} bytes but tx batch has {available} free")]
    BatchOverflow { needed: usize, available: usize },

    /// The port configuration cannot be honored.
    #[error("invalid port configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pmulink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pmulink_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, PortError>;

/// Errors reported by a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlashError {
    /// The sector erase did not complete.
    #[error("sector erase failed")]
    Erase,

    /// Programming a word failed.
    #[error("program failed at offset 0x{offset:04X}")]
    Program { offset: usize },

    /// The target word was not in the erased state.
    #[error("word at offset 0x{offset:04X} not erased")]
    NotErased { offset: usize },

    /// Access beyond the configured region.
    #[error("access out of bounds (offset 0x{offset:04X}, {len} bytes)")]
    OutOfBounds { offset: usize, len: usize },
}

/// Errors that can occur while persisting the configuration blob.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// There is no configuration to persist.
    #[error("configuration blob is empty")]
    Empty,

    /// The blob exceeds the store capacity.
    #[error("configuration too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// The flash device reported a failure.
    #[error("flash error: {0}")]
    Flash(#[from] FlashError),
}
