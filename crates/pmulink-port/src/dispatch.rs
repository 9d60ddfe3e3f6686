//! Request handlers.
//!
//! Every handler is safe to re-execute: the host re-issues a request when a
//! reply is lost, so a repeat must leave the device in the same state.

use pmulink_frame::command::{
    command_name, CLEAR_CONFIG, GET_CAPABILITIES, GET_CONFIG, LOAD_BINARY, NACK_INVALID_PARAMETER,
    NACK_MALFORMED, PING, RESET, SAVE_CONFIG, SET_OUTPUT, START_STREAM, STOP_STREAM,
};
use pmulink_frame::Frame;
use pmulink_transport::SerialLink;
use tracing::{debug, info, warn};

use crate::board::{Board, ChannelExecutor};
use crate::engine::FrameEngine;
use crate::flash::Flash;
use crate::port::Port;
use crate::reply::{self, BINARY_OUT_OF_SEQUENCE, CONFIG_CHUNK_SIZE};
use crate::telemetry::clamp_rate;

/// Progress of a chunked LoadBinary upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadState {
    /// Last chunk appended, if an upload is running or just completed.
    last: Option<u16>,
    total: u16,
    /// Channel count reported for `last`, repeated on a duplicate.
    last_channels: u16,
}

impl UploadState {
    fn restart(&mut self, total: u16) {
        self.last = None;
        self.total = total;
        self.last_channels = 0;
    }

    fn is_repeat(&self, index: u16) -> bool {
        self.last == Some(index)
    }

    fn is_next(&self, index: u16) -> bool {
        match self.last {
            Some(last) => last.checked_add(1) == Some(index) && index < self.total,
            None => index == 0,
        }
    }

    fn accept(&mut self, index: u16) -> bool {
        self.last = Some(index);
        index.saturating_add(1) >= self.total
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

const CHUNK_HEADER_SIZE: usize = 4;

impl<L, F, B, X, E> Port<L, F, B, X, E>
where
    L: SerialLink,
    F: Flash,
    B: Board,
    X: ChannelExecutor,
    E: FrameEngine,
{
    pub(crate) fn dispatch(&mut self, frame: Frame) {
        debug!(
            id = frame.id,
            command = command_name(frame.id),
            len = frame.payload.len(),
            "request"
        );

        let payload = frame.payload.as_ref();
        match frame.id {
            PING => self.send_reply(reply::pong()),
            RESET => self.handle_reset(),
            GET_CONFIG => self.handle_get_config(),
            LOAD_BINARY => self.handle_load_binary(payload),
            SAVE_CONFIG => self.handle_save_config(),
            CLEAR_CONFIG => self.handle_clear_config(),
            START_STREAM => self.handle_start_stream(payload),
            STOP_STREAM => {
                self.stream.stop();
                self.send_reply(reply::ack(STOP_STREAM));
            }
            SET_OUTPUT => self.handle_set_output(payload),
            GET_CAPABILITIES => self.send_reply(reply::capabilities(&self.config.device)),
            other => {
                warn!(id = other, "unknown command");
                self.send_reply(reply::unknown_command(other));
            }
        }
    }

    fn handle_reset(&mut self) -> ! {
        self.send_reply(reply::ack(RESET));
        self.board.system_reset()
    }

    fn handle_get_config(&mut self) {
        let blob = self.store.blob().to_vec();
        if blob.is_empty() {
            self.send_reply(reply::config_absent());
            return;
        }

        let total = reply::config_chunk_count(blob.len());
        for (index, chunk) in blob.chunks(CONFIG_CHUNK_SIZE).enumerate() {
            self.send_reply(reply::config_data(index as u16, total, chunk));
        }
    }

    fn handle_load_binary(&mut self, payload: &[u8]) {
        if payload.len() < CHUNK_HEADER_SIZE {
            warn!(len = payload.len(), "LoadBinary payload too short");
            self.send_reply(reply::nack(LOAD_BINARY, NACK_MALFORMED));
            return;
        }
        let index = u16::from_le_bytes([payload[0], payload[1]]);
        let total = u16::from_le_bytes([payload[2], payload[3]]);
        let data = &payload[CHUNK_HEADER_SIZE..];

        if index == 0 {
            self.store.reset_blob();
            self.upload.restart(total);
        } else if self.upload.is_repeat(index) {
            debug!(index, "repeated chunk re-acknowledged");
            self.send_reply(reply::binary_ack(self.upload.last_channels));
            return;
        } else if !self.upload.is_next(index) {
            warn!(index, total, last = ?self.upload.last, "chunk out of sequence");
            self.send_reply(reply::binary_rejected(BINARY_OUT_OF_SEQUENCE));
            return;
        }

        self.store.append(data);
        let channels = if self.upload.accept(index) {
            let channels = self.executor.load(self.store.blob());
            info!(size = self.store.blob().len(), channels, "configuration uploaded");
            channels
        } else {
            0
        };
        self.upload.last_channels = channels;
        self.send_reply(reply::binary_ack(channels));
    }

    fn handle_save_config(&mut self) {
        let ok = match self.store.persist(&mut self.board) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "SaveConfig failed");
                false
            }
        };
        self.send_reply(reply::flash_ack(ok));
    }

    fn handle_clear_config(&mut self) {
        if let Err(err) = self.store.clear(&mut self.board) {
            warn!(error = %err, "ClearConfig erase failed");
        }
        self.executor.clear();
        self.upload.reset();
        self.send_reply(reply::clear_config_ack(true));
    }

    fn handle_start_stream(&mut self, payload: &[u8]) {
        let requested = match payload {
            [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
            _ => 0,
        };
        let rate = clamp_rate(requested, self.config.default_rate_hz);
        self.stream.start(rate, self.board.now_ms());
        debug!(requested, rate, "stream started");
        self.send_reply(reply::ack(START_STREAM));
    }

    fn handle_set_output(&mut self, payload: &[u8]) {
        let [channel, state, ..] = *payload else {
            warn!(len = payload.len(), "SetOutput payload too short");
            self.send_reply(reply::nack(SET_OUTPUT, NACK_MALFORMED));
            return;
        };
        if channel >= self.config.device.output_count {
            warn!(channel, "SetOutput channel out of range");
            self.send_reply(reply::nack(SET_OUTPUT, NACK_INVALID_PARAMETER));
            return;
        }
        self.board.set_output(usize::from(channel), state != 0);
        self.send_reply(reply::output_ack(channel, state));
    }
}
