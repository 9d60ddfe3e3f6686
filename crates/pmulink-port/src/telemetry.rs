//! Telemetry snapshot builder and stream gating.

use bytes::{BufMut, BytesMut};
use pmulink_frame::telemetry::{CHANNEL_ENTRY_SIZE, MAX_PACKET_SIZE};
use pmulink_frame::TelemetryLayout;

use crate::board::{Board, ChannelExecutor};

pub const MIN_RATE_HZ: u16 = 1;
pub const MAX_RATE_HZ: u16 = 100;

/// Resolve a requested stream rate. 0 selects `default_hz`; anything else is
/// clamped to 1..=100.
pub fn clamp_rate(requested: u16, default_hz: u16) -> u16 {
    let rate = if requested == 0 { default_hz } else { requested };
    rate.clamp(MIN_RATE_HZ, MAX_RATE_HZ)
}

/// Periodic emission state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    active: bool,
    period_ms: u32,
    last_emit_ms: u32,
    counter: u32,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate at `rate_hz` (already clamped). The first snapshot is due one
    /// period after `now_ms`. The counter keeps running across sessions.
    pub fn start(&mut self, rate_hz: u16, now_ms: u32) {
        self.active = true;
        self.period_ms = 1000 / u32::from(rate_hz.max(MIN_RATE_HZ));
        self.last_emit_ms = now_ms;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// If a snapshot is due at `now_ms`, mark it emitted and return the
    /// counter value it must carry.
    pub fn poll_due(&mut self, now_ms: u32) -> Option<u32> {
        if !self.active || now_ms.wrapping_sub(self.last_emit_ms) < self.period_ms {
            return None;
        }
        self.last_emit_ms = now_ms;
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        Some(counter)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Append one telemetry snapshot to `dst`. Returns its length, never more
/// than 200 bytes.
pub fn build_snapshot<B, X>(
    layout: &TelemetryLayout,
    counter: u32,
    now_ms: u32,
    board: &B,
    executor: &X,
    dst: &mut BytesMut,
) -> usize
where
    B: Board + ?Sized,
    X: ChannelExecutor + ?Sized,
{
    let start = dst.len();
    dst.reserve(MAX_PACKET_SIZE);

    dst.put_u32_le(counter);
    dst.put_u32_le(now_ms);
    for channel in 0..layout.outputs {
        dst.put_u8(board.output_state(channel));
    }
    for index in 0..layout.analog_inputs {
        dst.put_u16_le(board.analog_input(index));
    }
    dst.put_u8(board.digital_inputs());
    dst.put_u32_le(now_ms / 1000);
    pad_to(dst, start + layout.channel_count());

    let channel_count = executor.channel_count();
    dst.put_u16_le(channel_count);
    // Reserved byte and status block stay zero.
    pad_to(dst, start + layout.repeated_channel_count());
    dst.put_u16_le(channel_count);
    debug_assert_eq!(dst.len() - start, layout.fixed_size());

    for index in 0..channel_count {
        if dst.len() - start + CHANNEL_ENTRY_SIZE > MAX_PACKET_SIZE {
            break;
        }
        let Some(value) = executor.channel(index) else {
            break;
        };
        dst.put_u16_le(value.id);
        dst.put_i32_le(value.value);
    }

    dst.len() - start
}

fn pad_to(dst: &mut BytesMut, offset: usize) {
    dst.put_bytes(0, offset.saturating_sub(dst.len()));
}
