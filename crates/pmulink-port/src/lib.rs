//! Device side of the PMU command/telemetry port.
//!
//! A [`Port`] sits between a byte-oriented [`SerialLink`] and the rest of
//! the firmware. It:
//! - arbitrates the single wire between outgoing frames and inbound bytes
//! - decodes requests and answers them ([`dispatch`])
//! - keeps the configuration blob in RAM and in flash ([`store`])
//! - emits periodic telemetry snapshots ([`telemetry`])
//!
//! Everything runs in one cooperative context. Board I/O, the flash sector
//! and the channel executor are supplied as capabilities
//! ([`Board`], [`Flash`], [`ChannelExecutor`]).
//!
//! [`SerialLink`]: pmulink_transport::SerialLink

pub mod arbiter;
pub mod board;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod flash;
pub mod port;
pub mod reply;
pub mod ring;
pub mod sim;
pub mod store;
pub mod telemetry;

pub use arbiter::{Arbiter, SendBatch};
pub use board::{Board, ChannelExecutor, Watchdog};
pub use config::{DeviceInfo, PortConfig};
pub use engine::{BasicEngine, FrameEngine, TxSink};
pub use error::{FlashError, PortError, Result, StoreError};
pub use flash::{Flash, MemFlash};
pub use port::{Port, PortParts};
pub use ring::{RxRing, TxBatch};
pub use sim::{ResetRequested, SimBoard, StaticExecutor};
pub use store::{ConfigStore, RecordHeader, CONFIG_MAGIC, DEFAULT_CONFIG_CAPACITY};
pub use telemetry::{build_snapshot, clamp_rate, StreamState};
