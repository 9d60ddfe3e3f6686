//! Telemetry snapshot layout (payload of [`DATA`](crate::command::DATA)).
//!
//! All multi-byte fields are little-endian:
//! ```text
//! counter u32 | timestamp_ms u32 | output state u8 × outputs
//! | adc u16 × analog inputs | digital bitmask u8 | uptime_s u32
//! | reserved 8 | channel count u16 | reserved 1 | status 10
//! | channel count u16 | { channel_id u16, value i32 } × n
//! ```
//! Channel entries stop before the packet would exceed [`MAX_PACKET_SIZE`].

use serde::Serialize;

use crate::error::{FrameError, Result};

/// Hard cap on a snapshot, channel entries included.
pub const MAX_PACKET_SIZE: usize = 200;
/// Size of one `{channel_id, value}` entry.
pub const CHANNEL_ENTRY_SIZE: usize = 6;
/// Entries the bridge decoder keeps.
pub const MAX_DECODED_CHANNELS: usize = 16;

/// Output count of the reference board.
pub const OUTPUT_COUNT: usize = 30;
/// Analog input count of the reference board.
pub const ANALOG_INPUT_COUNT: usize = 20;
/// Digital inputs packed into the bitmask byte.
pub const DIGITAL_INPUT_COUNT: usize = 8;
/// Outputs that contribute to the decoded fault mask.
pub const FAULT_MASK_OUTPUTS: usize = 8;

/// Raw output state: switched off.
pub const OUTPUT_OFF: u8 = 0;
/// Raw output state: switched on.
pub const OUTPUT_ON: u8 = 1;
/// Raw output state: driver reports a fault.
pub const OUTPUT_FAULT: u8 = 2;

const RESERVED_AFTER_UPTIME: usize = 8;
const RESERVED_AFTER_COUNT: usize = 1;
const STATUS_SIZE: usize = 10;

/// Field offsets for a board with a given output / analog input count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryLayout {
    pub outputs: usize,
    pub analog_inputs: usize,
}

impl TelemetryLayout {
    pub const fn new(outputs: usize, analog_inputs: usize) -> Self {
        Self {
            outputs,
            analog_inputs,
        }
    }

    pub const fn counter(&self) -> usize {
        0
    }

    pub const fn timestamp(&self) -> usize {
        4
    }

    pub const fn outputs(&self) -> usize {
        8
    }

    pub const fn analog(&self) -> usize {
        self.outputs() + self.outputs
    }

    pub const fn digital(&self) -> usize {
        self.analog() + 2 * self.analog_inputs
    }

    pub const fn uptime(&self) -> usize {
        self.digital() + 1
    }

    pub const fn channel_count(&self) -> usize {
        self.uptime() + 4 + RESERVED_AFTER_UPTIME
    }

    pub const fn status(&self) -> usize {
        self.channel_count() + 2 + RESERVED_AFTER_COUNT
    }

    pub const fn repeated_channel_count(&self) -> usize {
        self.status() + STATUS_SIZE
    }

    /// Everything up to and including the repeated channel count.
    pub const fn fixed_size(&self) -> usize {
        self.repeated_channel_count() + 2
    }

    /// Whether the fixed portion leaves the packet within [`MAX_PACKET_SIZE`].
    pub const fn fits(&self) -> bool {
        self.fixed_size() <= MAX_PACKET_SIZE
    }

    /// Channel entries that fit under [`MAX_PACKET_SIZE`].
    pub const fn max_channel_entries(&self) -> usize {
        let fixed = self.fixed_size();
        if fixed >= MAX_PACKET_SIZE {
            0
        } else {
            (MAX_PACKET_SIZE - fixed) / CHANNEL_ENTRY_SIZE
        }
    }
}

impl Default for TelemetryLayout {
    fn default() -> Self {
        Self::new(OUTPUT_COUNT, ANALOG_INPUT_COUNT)
    }
}

/// Fixed portion of a reference-board snapshot: 106 bytes.
pub const FIXED_SIZE: usize = TelemetryLayout::new(OUTPUT_COUNT, ANALOG_INPUT_COUNT).fixed_size();

/// One virtual channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelValue {
    pub id: u16,
    pub value: i32,
}

/// Display model decoded from a snapshot on the bridge side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryView {
    pub stream_counter: u32,
    pub timestamp_ms: u32,
    pub uptime_sec: u32,
    /// True when the output is switched on and healthy. One entry per output
    /// in the layout.
    pub outputs: Vec<bool>,
    /// Fault bits for the first 8 outputs.
    pub output_faults: u8,
    pub digital_inputs: [bool; DIGITAL_INPUT_COUNT],
    /// Placeholder conversion of analog input 0 (1:11 divider, 3.3 V ref).
    pub input_voltage_mv: u32,
    /// Placeholder conversion of analog input 1 (10 mV/°C, 500 mV offset).
    pub board_temp_c: i32,
    /// Declared virtual channel count, clamped to 16.
    pub channel_count: u16,
    pub channels: Vec<ChannelValue>,
}

/// Decode a snapshot built for the reference board layout (30 outputs,
/// 20 analog inputs).
///
/// Fails only when the buffer is shorter than [`FIXED_SIZE`]. Trailing bytes
/// that do not form a whole channel entry are ignored.
pub fn decode_telemetry(buf: &[u8]) -> Result<TelemetryView> {
    decode_telemetry_with(buf, &TelemetryLayout::default())
}

/// Decode a snapshot from a board with a non-reference I/O count.
///
/// Analog conversions read as zero when the layout has fewer than two
/// analog inputs.
pub fn decode_telemetry_with(buf: &[u8], layout: &TelemetryLayout) -> Result<TelemetryView> {
    let fixed = layout.fixed_size();
    if buf.len() < fixed {
        return Err(FrameError::TelemetryTooShort {
            len: buf.len(),
            min: fixed,
        });
    }

    let states = &buf[layout.outputs()..layout.outputs() + layout.outputs];
    let outputs = states.iter().map(|&state| state == OUTPUT_ON).collect();
    let output_faults = states
        .iter()
        .take(FAULT_MASK_OUTPUTS)
        .enumerate()
        .filter(|(_, state)| **state == OUTPUT_FAULT)
        .fold(0u8, |mask, (i, _)| mask | 1u8 << i);

    let mask = buf[layout.digital()];
    let mut digital_inputs = [false; DIGITAL_INPUT_COUNT];
    for (i, bit) in digital_inputs.iter_mut().enumerate() {
        *bit = mask & (1 << i) != 0;
    }

    let analog = |index: usize| {
        if index < layout.analog_inputs {
            read_u16(buf, layout.analog() + 2 * index)
        } else {
            0
        }
    };
    let adc0 = u32::from(analog(0));
    let adc1 = i32::from(analog(1));

    let declared = read_u16(buf, layout.repeated_channel_count());
    let channel_count = declared.min(MAX_DECODED_CHANNELS as u16);

    let available = (buf.len() - fixed) / CHANNEL_ENTRY_SIZE;
    let channels = (0..available.min(channel_count as usize))
        .map(|i| {
            let at = fixed + i * CHANNEL_ENTRY_SIZE;
            ChannelValue {
                id: read_u16(buf, at),
                value: read_u32(buf, at + 2) as i32,
            }
        })
        .collect();

    Ok(TelemetryView {
        stream_counter: read_u32(buf, layout.counter()),
        timestamp_ms: read_u32(buf, layout.timestamp()),
        uptime_sec: read_u32(buf, layout.uptime()),
        outputs,
        output_faults,
        digital_inputs,
        input_voltage_mv: adc0 * 3300 * 11 / 4095,
        board_temp_c: (adc1 * 3300 / 4095 - 500) / 10,
        channel_count,
        channels,
    })
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(counter: u32, uptime: u32, states: &[u8; OUTPUT_COUNT]) -> Vec<u8> {
        let layout = TelemetryLayout::default();
        let mut buf = vec![0u8; FIXED_SIZE];
        buf[..4].copy_from_slice(&counter.to_le_bytes());
        buf[layout.outputs()..layout.outputs() + OUTPUT_COUNT].copy_from_slice(states);
        buf[layout.uptime()..layout.uptime() + 4].copy_from_slice(&uptime.to_le_bytes());
        buf
    }

    fn push_channels(buf: &mut Vec<u8>, declared: u16, entries: &[(u16, i32)]) {
        let at = TelemetryLayout::default().repeated_channel_count();
        buf[at..at + 2].copy_from_slice(&declared.to_le_bytes());
        for (id, value) in entries {
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    #[test]
    fn reference_layout_offsets() {
        let layout = TelemetryLayout::default();
        assert_eq!(layout.analog(), 38);
        assert_eq!(layout.digital(), 78);
        assert_eq!(layout.uptime(), 79);
        assert_eq!(layout.channel_count(), 91);
        assert_eq!(layout.repeated_channel_count(), 104);
        assert_eq!(FIXED_SIZE, 106);
        assert_eq!(layout.max_channel_entries(), 15);
    }

    #[test]
    fn decodes_fault_on_channel_three() {
        let mut states = [OUTPUT_ON; OUTPUT_COUNT];
        states[3] = OUTPUT_FAULT;
        let buf = snapshot(7, 120, &states);

        let view = decode_telemetry(&buf).unwrap();

        assert_eq!(view.stream_counter, 7);
        assert_eq!(view.uptime_sec, 120);
        assert!(!view.outputs[3]);
        assert!(view.outputs[2]);
        assert_eq!(view.output_faults, 1 << 3);
        assert!(view.channels.is_empty());
    }

    #[test]
    fn faults_beyond_eighth_output_are_not_masked() {
        let mut states = [OUTPUT_OFF; OUTPUT_COUNT];
        states[12] = OUTPUT_FAULT;
        let view = decode_telemetry(&snapshot(0, 0, &states)).unwrap();
        assert_eq!(view.output_faults, 0);
        assert!(!view.outputs[12]);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = decode_telemetry(&[0u8; FIXED_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::TelemetryTooShort { len: 105, min: 106 }
        ));
    }

    #[test]
    fn digital_bits_follow_mask() {
        let mut buf = snapshot(0, 0, &[OUTPUT_OFF; OUTPUT_COUNT]);
        buf[TelemetryLayout::default().digital()] = 0b1000_0101;
        let view = decode_telemetry(&buf).unwrap();
        assert_eq!(
            view.digital_inputs,
            [true, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn reads_channels_up_to_declared_count() {
        let mut buf = snapshot(1, 1, &[OUTPUT_OFF; OUTPUT_COUNT]);
        push_channels(&mut buf, 2, &[(100, -5), (101, 70_000), (102, 1)]);

        let view = decode_telemetry(&buf).unwrap();
        assert_eq!(view.channel_count, 2);
        assert_eq!(
            view.channels,
            vec![
                ChannelValue { id: 100, value: -5 },
                ChannelValue {
                    id: 101,
                    value: 70_000
                },
            ]
        );
    }

    #[test]
    fn ignores_trailing_partial_entry() {
        let mut buf = snapshot(1, 1, &[OUTPUT_OFF; OUTPUT_COUNT]);
        push_channels(&mut buf, 5, &[(1, 10)]);
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let view = decode_telemetry(&buf).unwrap();
        assert_eq!(view.channel_count, 5);
        assert_eq!(view.channels, vec![ChannelValue { id: 1, value: 10 }]);
    }

    #[test]
    fn clamps_declared_count() {
        let mut buf = snapshot(1, 1, &[OUTPUT_OFF; OUTPUT_COUNT]);
        let entries: Vec<(u16, i32)> = (0..20).map(|i| (i, i as i32)).collect();
        push_channels(&mut buf, 40, &entries);

        let view = decode_telemetry(&buf).unwrap();
        assert_eq!(view.channel_count, 16);
        assert_eq!(view.channels.len(), 16);
    }

    #[test]
    fn fixed_portion_limits() {
        assert!(TelemetryLayout::default().fits());
        // 36 + outputs + 2 * analog inputs
        assert!(TelemetryLayout::new(30, 67).fits());
        assert_eq!(TelemetryLayout::new(30, 67).fixed_size(), 200);
        assert!(!TelemetryLayout::new(30, 68).fits());
        assert_eq!(TelemetryLayout::new(30, 80).max_channel_entries(), 0);
    }

    #[test]
    fn decodes_board_with_custom_layout() {
        let layout = TelemetryLayout::new(4, 1);
        let mut buf = vec![0u8; layout.fixed_size()];
        buf[..4].copy_from_slice(&3u32.to_le_bytes());
        buf[layout.outputs()..layout.outputs() + 4]
            .copy_from_slice(&[OUTPUT_ON, OUTPUT_FAULT, OUTPUT_OFF, OUTPUT_ON]);
        buf[layout.analog()..layout.analog() + 2].copy_from_slice(&4095u16.to_le_bytes());
        buf[layout.digital()] = 0b10;
        let at = layout.repeated_channel_count();
        buf[at..at + 2].copy_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&7u16.to_le_bytes());
        buf.extend_from_slice(&(-9i32).to_le_bytes());

        let view = decode_telemetry_with(&buf, &layout).unwrap();
        assert_eq!(view.stream_counter, 3);
        assert_eq!(view.outputs, vec![true, false, false, true]);
        assert_eq!(view.output_faults, 0b10);
        assert!(view.digital_inputs[1]);
        assert_eq!(view.input_voltage_mv, 36_300);
        assert_eq!(view.board_temp_c, -50);
        assert_eq!(view.channels, vec![ChannelValue { id: 7, value: -9 }]);

        let err = decode_telemetry_with(&buf[..layout.fixed_size() - 1], &layout).unwrap_err();
        assert!(matches!(err, FrameError::TelemetryTooShort { len: 41, min: 42 }));
    }

    #[test]
    fn placeholder_analog_conversions() {
        let mut buf = snapshot(0, 0, &[OUTPUT_OFF; OUTPUT_COUNT]);
        let at = TelemetryLayout::default().analog();
        buf[at..at + 2].copy_from_slice(&4095u16.to_le_bytes());
        buf[at + 2..at + 4].copy_from_slice(&1241u16.to_le_bytes());

        let view = decode_telemetry(&buf).unwrap();
        assert_eq!(view.input_voltage_mv, 36_300);
        assert_eq!(view.board_temp_c, 50);
    }
}
