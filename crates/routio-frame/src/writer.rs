use std::io::{ErrorKind, Write};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Queues complete frames for a non-blocking `Write` stream.
///
/// [`FrameWriter::enqueue`] only encodes; [`FrameWriter::flush_pending`]
/// writes what the stream accepts and keeps the rest for the next
/// writable turn.
pub struct FrameWriter<T> {
    inner: T,
    pending: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode a frame onto the outbound queue without writing.
    ///
    /// Fails with [`FrameError::Backpressure`] when the queue would grow
    /// past the high-water mark. An empty queue always accepts one frame,
    /// so a single frame larger than the mark can still be sent.
    pub fn enqueue(&mut self, frame: &Frame) -> Result<()> {
        self.config.check(frame)?;

        let size = frame.wire_size();
        if !self.pending.is_empty() && self.pending.len() + size > self.config.high_water_mark {
            return Err(FrameError::Backpressure {
                buffered: self.pending.len(),
                limit: self.config.high_water_mark,
            });
        }

        encode_frame(frame, &mut self.pending)
    }

    /// Write as much of the outbound queue as the stream accepts.
    ///
    /// Returns `Ok(true)` once the queue is empty, `Ok(false)` if the stream
    /// would block with bytes still queued.
    pub fn flush_pending(&mut self) -> Result<bool> {
        while !self.pending.is_empty() {
            match self.inner.write(&self.pending) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.pending.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    trace!(queued = self.pending.len(), "write would block");
                    return Ok(false);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        match self.inner.flush() {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(true),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(true),
            Err(err) => Err(FrameError::Io(err)),
        }
    }

    /// Bytes waiting in the outbound queue.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the outbound queue holds unwritten bytes.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop everything still queued.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
