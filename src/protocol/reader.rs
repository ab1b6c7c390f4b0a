//! Async frame reader over any `AsyncRead`.
//!
//! Pairs a reader with a [`FrameBuffer`] so lines (tunnel head, options
//! handshake) and frames can be read from one stream without losing bytes
//! that arrived in the same read.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Frame, FrameBuffer};
use crate::error::{Result, RpcError};

/// Read buffer size per syscall.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered reader yielding lines and frames.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with the default body limit.
    pub fn new(reader: R) -> Self {
        Self::with_buffer(reader, FrameBuffer::new())
    }

    /// Wrap a reader with a custom body limit.
    pub fn with_max_body(reader: R, max_body_size: u32) -> Self {
        Self::with_buffer(reader, FrameBuffer::with_max_body(max_body_size))
    }

    fn with_buffer(reader: R, buffer: FrameBuffer) -> Self {
        Self {
            reader,
            buffer,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read more bytes into the buffer. Returns `false` on EOF.
    async fn fill(&mut self) -> Result<bool> {
        let n = self.reader.read(&mut self.chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buffer.extend(&self.chunk[..n]);
        Ok(true)
    }

    /// Read one `\n`-terminated line of at most `max_len` bytes.
    ///
    /// Returns `Ok(None)` if the stream ends before a full line.
    pub async fn read_line(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        loop {
            if let Some(line) = self.buffer.take_line(max_len)? {
                return Ok(Some(line));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames and a framing error
    /// if the stream ends mid-frame.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.buffer.next_frame()? {
                return Ok(Some(frame));
            }
            if !self.fill().await? {
                if self.buffer.is_mid_frame() {
                    return Err(RpcError::Framing(
                        "connection closed mid-frame".to_string(),
                    ));
                }
                return Ok(None);
            }
        }
    }
}
