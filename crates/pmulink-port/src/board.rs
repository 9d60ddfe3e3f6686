//! Capabilities the port needs from the rest of the firmware.

use pmulink_frame::ChannelValue;
use pmulink_transport::Clock;

/// Independent watchdog.
pub trait Watchdog {
    /// Acknowledge the watchdog, restarting its countdown.
    fn refresh(&mut self);
}

/// Board-level I/O: output drivers, ADC, digital inputs, reset.
pub trait Board: Clock + Watchdog {
    /// Raw driver state of an output (0 off, 1 on, 2 fault).
    fn output_state(&self, channel: usize) -> u8;

    fn set_output(&mut self, channel: usize, on: bool);

    /// Latest raw ADC sample of an analog input.
    fn analog_input(&self, index: usize) -> u16;

    /// Digital inputs 0-7 packed LSB first.
    fn digital_inputs(&self) -> u8;

    /// Reset the MCU. Never returns.
    fn system_reset(&mut self) -> !;
}

/// Interpreter for the configuration blob.
pub trait ChannelExecutor {
    /// Replace the running configuration. Returns the number of channels.
    fn load(&mut self, blob: &[u8]) -> u16;

    /// Drop all channels.
    fn clear(&mut self);

    fn channel_count(&self) -> u16;

    /// Current value of the channel at `index`.
    fn channel(&self, index: u16) -> Option<ChannelValue>;
}
