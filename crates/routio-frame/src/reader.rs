use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;
/// Chunks consumed per [`FrameReader::read_available`] call, so one busy
/// peer cannot starve the rest of the event loop.
const READ_BUDGET_CHUNKS: usize = 64;

/// Frames reassembled by one non-blocking read pass.
#[derive(Debug, Default)]
pub struct ReadBatch {
    /// Complete frames, in arrival order.
    pub frames: Vec<Frame>,
    /// The peer closed its side of the stream.
    pub eof: bool,
}

/// Reassembles frames from a non-blocking `Read` stream.
///
/// Partial frames stay buffered between calls; callers only ever see
/// complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
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
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read whatever the stream has without blocking and return every
    /// complete frame.
    ///
    /// The stream must be in non-blocking mode. Partial frames stay buffered
    /// for the next call. A header violation is returned as an error and the
    /// frames of this pass are discarded with it; the stream is unusable
    /// afterwards.
    pub fn read_available(&mut self) -> Result<ReadBatch> {
        let mut batch = ReadBatch::default();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        let mut chunks = 0usize;
        while chunks < READ_BUDGET_CHUNKS {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    batch.eof = true;
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    chunks += 1;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        while let Some(frame) = decode_frame(&mut self.buf, &self.config)? {
            batch.frames.push(frame);
        }
        Ok(batch)
    }

    /// Bytes of an incomplete frame currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
