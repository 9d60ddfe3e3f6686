//! Host-side stand-ins for the board and the channel executor.
//!
//! Used by the CLI `simulate` command and by tests. [`SimBoard`] models a
//! reset by unwinding with a [`ResetRequested`] payload, which the caller
//! catches with `std::panic::catch_unwind` to "reboot" the port.

use pmulink_frame::telemetry::{
    ANALOG_INPUT_COUNT, CHANNEL_ENTRY_SIZE, OUTPUT_COUNT, OUTPUT_FAULT, OUTPUT_OFF, OUTPUT_ON,
};
use pmulink_frame::ChannelValue;
use pmulink_transport::{Clock, ManualClock};
use tracing::{debug, info};

use crate::board::{Board, ChannelExecutor, Watchdog};

/// Panic payload raised by [`SimBoard::system_reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequested;

/// Simulated board with a manually advanced clock.
#[derive(Debug, Clone)]
pub struct SimBoard {
    clock: ManualClock,
    outputs: Vec<u8>,
    analog: Vec<u16>,
    digital: u8,
    watchdog_refreshes: u64,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::with_io(OUTPUT_COUNT, ANALOG_INPUT_COUNT)
    }

    pub fn with_io(outputs: usize, analog_inputs: usize) -> Self {
        Self {
            clock: ManualClock::new(0),
            outputs: vec![OUTPUT_OFF; outputs],
            analog: vec![0; analog_inputs],
            digital: 0,
            watchdog_refreshes: 0,
        }
    }

    /// Handle on the board clock. Clones share the same time.
    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    pub fn advance(&self, ms: u32) {
        self.clock.advance(ms);
    }

    /// Latch an output driver into its fault state.
    pub fn set_fault(&mut self, channel: usize) {
        if let Some(state) = self.outputs.get_mut(channel) {
            *state = OUTPUT_FAULT;
        }
    }

    pub fn set_analog(&mut self, index: usize, raw: u16) {
        if let Some(sample) = self.analog.get_mut(index) {
            *sample = raw;
        }
    }

    pub fn set_digital_inputs(&mut self, mask: u8) {
        self.digital = mask;
    }

    pub fn watchdog_refreshes(&self) -> u64 {
        self.watchdog_refreshes
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimBoard {
    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }
}

impl Watchdog for SimBoard {
    fn refresh(&mut self) {
        self.watchdog_refreshes += 1;
    }
}

impl Board for SimBoard {
    fn output_state(&self, channel: usize) -> u8 {
        self.outputs.get(channel).copied().unwrap_or(OUTPUT_OFF)
    }

    fn set_output(&mut self, channel: usize, on: bool) {
        if let Some(state) = self.outputs.get_mut(channel) {
            *state = if on { OUTPUT_ON } else { OUTPUT_OFF };
            debug!(channel, on, "output driven");
        }
    }

    fn analog_input(&self, index: usize) -> u16 {
        self.analog.get(index).copied().unwrap_or(0)
    }

    fn digital_inputs(&self) -> u8 {
        self.digital
    }

    fn system_reset(&mut self) -> ! {
        info!("system reset requested");
        std::panic::panic_any(ResetRequested)
    }
}

/// Executor whose configuration is a flat list of channel values.
///
/// Each 6-byte record is `{id u16 LE, value i32 LE}`; a trailing partial
/// record is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticExecutor {
    channels: Vec<ChannelValue>,
}

impl StaticExecutor {
    pub fn from_channels(channels: Vec<ChannelValue>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[ChannelValue] {
        &self.channels
    }

    /// Encode channels in the format [`load`](ChannelExecutor::load) accepts.
    pub fn encode(channels: &[ChannelValue]) -> Vec<u8> {
        let mut out = Vec::with_capacity(channels.len() * CHANNEL_ENTRY_SIZE);
        for channel in channels {
            out.extend_from_slice(&channel.id.to_le_bytes());
            out.extend_from_slice(&channel.value.to_le_bytes());
        }
        out
    }
}

impl ChannelExecutor for StaticExecutor {
    fn load(&mut self, blob: &[u8]) -> u16 {
        self.channels = blob
            .chunks_exact(CHANNEL_ENTRY_SIZE)
            .take(u16::MAX as usize)
            .map(|rec| ChannelValue {
                id: u16::from_le_bytes([rec[0], rec[1]]),
                value: i32::from_le_bytes([rec[2], rec[3], rec[4], rec[5]]),
            })
            .collect();
        self.channels.len() as u16
    }

    fn clear(&mut self) {
        self.channels.clear();
    }

    fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    fn channel(&self, index: u16) -> Option<ChannelValue> {
        self.channels.get(usize::from(index)).copied()
    }
}
