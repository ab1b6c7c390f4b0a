//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForPrefix`: Need at least 8 bytes
//! - `WaitingForParts`: Prefix parsed, need header + body bytes
//!
//! The buffer also hands out newline-terminated lines for the text parts of
//! a connection (HTTP tunnel head, options handshake). Bytes following a
//! line stay buffered for frame parsing.

use bytes::{Bytes, BytesMut};

use super::wire_format::{FramePrefix, DEFAULT_MAX_BODY_SIZE, PREFIX_SIZE};
use super::Frame;
use crate::error::{Result, RpcError};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for complete prefix (need 8 bytes).
    WaitingForPrefix,
    /// Prefix parsed, waiting for header and body bytes.
    WaitingForParts { prefix: FramePrefix },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_body_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max body: 64MB.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    /// Create a new frame buffer with custom max body size.
    pub fn with_max_body(max_body_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForPrefix,
            max_body_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// # Errors
    ///
    /// Returns error if a prefix violates the size limits.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append data to the buffer without extracting anything.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if protocol violation (e.g., body too large)
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let State::WaitingForPrefix = self.state {
            let prefix = match FramePrefix::decode(&self.buffer) {
                Some(p) => p,
                None => return Ok(None),
            };
            prefix.validate(self.max_body_size)?;

            let _ = self.buffer.split_to(PREFIX_SIZE);
            self.state = State::WaitingForParts { prefix };
        }

        let State::WaitingForParts { prefix } = self.state else {
            return Ok(None);
        };

        let header_len = prefix.header_length as usize;
        let body_len = prefix.body_length as usize;
        if self.buffer.len() < header_len + body_len {
            return Ok(None);
        }

        let header = self.buffer.split_to(header_len).freeze();
        let body = if body_len == 0 {
            Bytes::new()
        } else {
            self.buffer.split_to(body_len).freeze()
        };

        self.state = State::WaitingForPrefix;
        Ok(Some(Frame::new(header, body)))
    }

    /// Take one `\n`-terminated line (without the terminator and any `\r`).
    ///
    /// Returns `Ok(None)` if no full line is buffered yet, or an error if
    /// more than `max_len` bytes arrive without a newline.
    pub fn take_line(&mut self, max_len: usize) -> Result<Option<Bytes>> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > max_len => Err(RpcError::Protocol(format!(
                "line exceeds {} bytes",
                max_len
            ))),
            Some(pos) => {
                let mut line = self.buffer.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                Ok(Some(line.freeze()))
            }
            None if self.buffer.len() > max_len => Err(RpcError::Protocol(format!(
                "line exceeds {} bytes",
                max_len
            ))),
            None => Ok(None),
        }
    }

    /// Whether a frame is partially buffered.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::WaitingForParts { .. }) || !self.buffer.is_empty()
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
