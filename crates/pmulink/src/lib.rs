//! PMU command/telemetry link.
//!
//! pmulink connects a host to a power-management controller over a
//! byte-oriented serial link: framed commands in, acknowledgements and
//! periodic telemetry snapshots out.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial link and clock capabilities, in-memory link
//! - [`frame`]: wire codec, CRC engine, command ids, telemetry decoder
//! - [`port`]: device-side port adapter (arbiter, dispatcher, config store)

/// Re-export transport types.
pub mod transport {
    pub use pmulink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pmulink_frame::*;
}

/// Re-export port types.
pub mod port {
    pub use pmulink_port::*;
}
