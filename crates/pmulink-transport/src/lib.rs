//! Byte-level serial link abstraction for the PMU command port.
//!
//! The port never touches UART registers directly. Everything it needs from
//! the hardware is expressed by two capabilities:
//! - [`SerialLink`]: busy-wait transmit flags plus single-byte read/write
//! - [`Clock`]: a monotonic millisecond counter
//!
//! This is the lowest layer of pmulink. [`MemoryLink`] and [`ManualClock`]
//! provide scripted in-memory implementations for host simulation and tests.

pub mod clock;
pub mod error;
pub mod memory;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TransportError};
pub use memory::MemoryLink;
pub use traits::SerialLink;
