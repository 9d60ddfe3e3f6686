use pmulink_transport::SerialLink;
use tracing::{trace, warn};

use crate::engine::TxSink;
use crate::error::{PortError, Result};
use crate::ring::{RxRing, TxBatch};

/// Owns the wire.
///
/// A frame is collected into a [`TxBatch`] and only then pushed out byte by
/// byte with busy-waits on the link's ready flags. Every wait iteration pulls
/// inbound bytes into an [`RxRing`], so nothing is lost while the single
/// execution context is stuck transmitting. The buffered bytes are replayed
/// by the caller once the send finishes, under a reentrancy guard
/// ([`begin_drain`](Arbiter::begin_drain) / [`end_drain`](Arbiter::end_drain)).
#[derive(Debug)]
pub struct Arbiter<L> {
    link: L,
    batch: TxBatch,
    ring: RxRing,
    draining: bool,
}

impl<L: SerialLink> Arbiter<L> {
    pub fn new(link: L, tx_capacity: usize, rx_capacity: usize) -> Self {
        Self {
            link,
            batch: TxBatch::with_capacity(tx_capacity),
            ring: RxRing::with_capacity(rx_capacity),
            draining: false,
        }
    }

    /// Start collecting a frame.
    ///
    /// The returned [`SendBatch`] borrows the arbiter, so nothing else can
    /// begin a send or append bytes until it is finished or dropped. Fails
    /// with [`PortError::Busy`] if a batch was leaked while still open.
    pub fn begin_send(&mut self) -> Result<SendBatch<'_, L>> {
        if self.batch.begin() {
            Ok(SendBatch { arbiter: self })
        } else {
            Err(PortError::Busy)
        }
    }

    pub fn is_sending(&self) -> bool {
        self.batch.in_progress()
    }

    fn append_byte(&mut self, byte: u8) {
        if !self.batch.push(byte) {
            trace!(byte, "tx batch full, byte dropped");
        }
    }

    fn end_send(&mut self) -> Result<usize> {
        let dropped_before = self.ring.dropped();
        let result = self.transmit();
        self.batch.finish();

        let dropped = self.ring.dropped() - dropped_before;
        if dropped > 0 {
            warn!(
                dropped,
                capacity = self.ring.capacity(),
                "rx ring overflow during transmit"
            );
        }
        result
    }

    fn transmit(&mut self) -> Result<usize> {
        let len = self.batch.len();
        if len == 0 {
            return Ok(0);
        }

        for i in 0..len {
            let byte = self.batch.as_slice()[i];
            loop {
                self.capture_inbound();
                if self.link.tx_ready() {
                    break;
                }
            }
            self.link.write(byte)?;
        }

        loop {
            self.capture_inbound();
            if self.link.tx_complete() {
                break;
            }
        }

        trace!(len, buffered = self.ring.len(), "batch transmitted");
        Ok(len)
    }

    fn capture_inbound(&mut self) {
        loop {
            match self.link.read() {
                Ok(Some(byte)) => {
                    self.ring.push(byte);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "receive fault while transmitting");
                    break;
                }
            }
        }
    }

    /// Buffer a byte delivered by the receive path while the wire is busy.
    pub fn capture(&mut self, byte: u8) {
        if !self.ring.push(byte) {
            warn!(capacity = self.ring.capacity(), "rx ring full, byte dropped");
        }
    }

    /// Enter the drain section. Returns `false` if a drain is already running,
    /// in which case the outer drain picks up whatever is buffered.
    pub fn begin_drain(&mut self) -> bool {
        if self.draining {
            return false;
        }
        self.draining = true;
        true
    }

    pub fn next_buffered(&mut self) -> Option<u8> {
        self.ring.pop()
    }

    pub fn end_drain(&mut self) {
        self.draining = false;
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    /// Bytes lost to ring overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.ring.dropped()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }
}

/// An open frame on the [`Arbiter`].
///
/// Dropping it without [`end_send`](SendBatch::end_send) discards the
/// collected bytes.
#[derive(Debug)]
pub struct SendBatch<'a, L: SerialLink> {
    arbiter: &'a mut Arbiter<L>,
}

impl<L: SerialLink> SendBatch<'_, L> {
    /// Append to the batch. Bytes past capacity are dropped.
    pub fn append_byte(&mut self, byte: u8) {
        self.arbiter.append_byte(byte);
    }

    pub fn space_remaining(&self) -> usize {
        self.arbiter.batch.space_remaining()
    }

    /// Transmit the collected batch and release it.
    ///
    /// Blocks until the link reports transmission complete. Returns the
    /// number of bytes written. The batch is released even when the link
    /// fails part-way.
    pub fn end_send(self) -> Result<usize> {
        self.arbiter.end_send()
    }

    /// Discard the batch without transmitting it.
    pub fn abort(self) {}
}

impl<L: SerialLink> Drop for SendBatch<'_, L> {
    fn drop(&mut self) {
        self.arbiter.batch.finish();
    }
}

impl<L: SerialLink> TxSink for SendBatch<'_, L> {
    fn append_byte(&mut self, byte: u8) {
        SendBatch::append_byte(self, byte);
    }

    fn space_remaining(&self) -> usize {
        SendBatch::space_remaining(self)
    }
}
