use std::collections::VecDeque;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::SerialLink;

/// Scripted in-memory serial link.
///
/// Transmitted bytes are recorded; inbound bytes are either queued up front
/// with [`push_inbound`](MemoryLink::push_inbound) or released once a given
/// number of bytes has been transmitted with
/// [`inject_after`](MemoryLink::inject_after), which models a host that keeps
/// talking while the device is mid-reply.
///
/// `tx_latency` makes `tx_ready()` report busy for that many polls after each
/// write, so the caller's busy-wait loop actually spins.
#[derive(Debug, Default)]
pub struct MemoryLink {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    scheduled: VecDeque<(usize, Vec<u8>)>,
    tx_latency: u32,
    busy_polls: u32,
    complete_polls: u32,
    pending_fault: Option<&'static str>,
    closed: bool,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report "not ready" for `polls` polls after every transmitted byte.
    pub fn with_tx_latency(mut self, polls: u32) -> Self {
        self.tx_latency = polls;
        self
    }

    /// Make bytes readable immediately.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Make bytes readable once `written` bytes in total have been transmitted.
    pub fn inject_after(&mut self, written: usize, bytes: &[u8]) {
        if written <= self.tx.len() {
            self.push_inbound(bytes);
            return;
        }
        let at = self
            .scheduled
            .iter()
            .position(|(threshold, _)| *threshold > written)
            .unwrap_or(self.scheduled.len());
        self.scheduled.insert(at, (written, bytes.to_vec()));
    }

    /// All bytes transmitted so far.
    pub fn written(&self) -> &[u8] {
        &self.tx
    }

    /// Drain and return the transmitted bytes.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    /// Number of inbound bytes not yet read.
    pub fn pending_inbound(&self) -> usize {
        self.rx.len() + self.scheduled.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    /// Make the next `read()` report a receive fault instead of data.
    pub fn inject_fault(&mut self, reason: &'static str) {
        self.pending_fault = Some(reason);
    }

    /// Refuse all further writes.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn release_scheduled(&mut self) {
        while let Some((threshold, _)) = self.scheduled.front() {
            if *threshold > self.tx.len() {
                break;
            }
            if let Some((_, bytes)) = self.scheduled.pop_front() {
                trace!(count = bytes.len(), "releasing scheduled inbound bytes");
                self.rx.extend(bytes);
            }
        }
    }
}

impl SerialLink for MemoryLink {
    fn tx_ready(&mut self) -> bool {
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return false;
        }
        true
    }

    fn tx_complete(&mut self) -> bool {
        if self.complete_polls > 0 {
            self.complete_polls -= 1;
            return false;
        }
        true
    }

    fn write(&mut self, byte: u8) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx.push(byte);
        self.busy_polls = self.tx_latency;
        self.complete_polls = self.tx_latency;
        self.release_scheduled();
        Ok(())
    }

    fn read(&mut self) -> Result<Option<u8>> {
        if let Some(reason) = self.pending_fault.take() {
            return Err(TransportError::Fault(reason));
        }
        Ok(self.rx.pop_front())
    }
}
