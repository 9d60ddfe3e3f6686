//! Bounded buffers owned by the arbiter.

/// Fixed-capacity FIFO for bytes that arrive while a frame is on the wire.
///
/// `head == tail` means empty. One slot is kept spare, so a ring built with
/// `with_capacity(n)` stores exactly `n` bytes. A push into a full ring is
/// dropped; unread data is never overwritten.
#[derive(Debug)]
pub struct RxRing {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    dropped: u64,
}

impl RxRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
            dropped: 0,
        }
    }

    /// Returns `false` (and counts the byte as dropped) when full.
    pub fn push(&mut self, byte: u8) -> bool {
        let next = self.advance(self.head);
        if next == self.tail {
            self.dropped += 1;
            return false;
        }
        self.buf[self.head] = byte;
        self.head = next;
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = self.advance(self.tail);
        Some(byte)
    }

    pub fn len(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.buf.len() - self.tail + self.head
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    /// Bytes rejected because the ring was full, since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn advance(&self, idx: usize) -> usize {
        let next = idx + 1;
        if next == self.buf.len() {
            0
        } else {
            next
        }
    }
}

/// One frame's wire bytes, collected before transmission starts.
#[derive(Debug)]
pub struct TxBatch {
    bytes: Vec<u8>,
    capacity: usize,
    in_progress: bool,
}

impl TxBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            in_progress: false,
        }
    }

    /// Start collecting a new frame. Returns `false` if one is in progress.
    pub fn begin(&mut self) -> bool {
        if self.in_progress {
            return false;
        }
        self.bytes.clear();
        self.in_progress = true;
        true
    }

    /// Append while collecting; bytes past capacity are dropped.
    pub fn push(&mut self, byte: u8) -> bool {
        if !self.in_progress || self.bytes.len() >= self.capacity {
            return false;
        }
        self.bytes.push(byte);
        true
    }

    pub fn finish(&mut self) {
        self.bytes.clear();
        self.in_progress = false;
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn space_remaining(&self) -> usize {
        if self.in_progress {
            self.capacity - self.bytes.len()
        } else {
            0
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ring_is_fifo() {
        let mut ring = RxRing::with_capacity(4);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert_eq!(ring.pop(), Some(1));
        assert!(ring.push(3));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_holds_exact_capacity() {
        let mut ring = RxRing::with_capacity(3);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert_eq!(ring.len(), 3);
        assert!(!ring.push(4));
        assert_eq!(ring.dropped(), 1);
        assert_eq!(ring.pop(), Some(1));
    }

    #[test]
    fn ring_len_across_wrap() {
        let mut ring = RxRing::with_capacity(3);
        for b in 0..3 {
            ring.push(b);
        }
        ring.pop();
        ring.pop();
        ring.push(9);
        ring.push(10);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(9));
        assert_eq!(ring.pop(), Some(10));
        assert!(ring.is_empty());
    }

    #[test]
    fn batch_only_collects_while_in_progress() {
        let mut batch = TxBatch::with_capacity(4);
        assert!(!batch.push(1));
        assert_eq!(batch.space_remaining(), 0);

        assert!(batch.begin());
        assert!(!batch.begin());
        assert!(batch.push(1));
        assert_eq!(batch.space_remaining(), 3);

        batch.finish();
        assert!(batch.is_empty());
        assert!(!batch.in_progress());
    }

    #[test]
    fn batch_drops_past_capacity() {
        let mut batch = TxBatch::with_capacity(2);
        batch.begin();
        assert!(batch.push(1));
        assert!(batch.push(2));
        assert!(!batch.push(3));
        assert_eq!(batch.as_slice(), &[1, 2]);
    }

    proptest! {
        #[test]
        fn overflow_drops_only_the_excess(
            capacity in 1usize..64,
            input in proptest::collection::vec(any::<u8>(), 0..160),
        ) {
            let mut ring = RxRing::with_capacity(capacity);
            for &b in &input {
                ring.push(b);
            }

            let kept: Vec<u8> = std::iter::from_fn(|| ring.pop()).collect();
            let expected = &input[..input.len().min(capacity)];
            prop_assert_eq!(kept.as_slice(), expected);
            prop_assert_eq!(
                ring.dropped() as usize,
                input.len().saturating_sub(capacity)
            );
        }
    }
}
