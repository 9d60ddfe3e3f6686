use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::codec::{decode_frame, Frame, FrameConfig, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// With `resync` enabled (the default) corrupt bytes are skipped.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    discarded: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(2 * MAX_FRAME_SIZE),
            config,
            discarded: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(err) if self.config.resync && !matches!(err, FrameError::Io(_)) => {
                    if self.discarded == 0 {
                        warn!(error = %err, "corrupt bytes in stream, resynchronizing");
                    }
                    self.buf.advance(1);
                    self.discarded += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes skipped while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    /// Yields frames until a clean end of stream.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(FrameError::ConnectionClosed) if self.buf.is_empty() => None,
            Err(FrameError::ConnectionClosed) => {
                // Report the truncated tail once, then end.
                self.buf.clear();
                Some(Err(FrameError::ConnectionClosed))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
