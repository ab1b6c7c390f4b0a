//! Wire format encoding and decoding.
//!
//! Every call frame is an 8-byte length prefix followed by the codec-encoded
//! header and the codec-encoded body:
//! ```text
//! ┌────────────┬────────────┬──────────────┬────────────┐
//! │ Header len │ Body len   │ Header       │ Body       │
//! │ uint32 BE  │ uint32 BE  │ codec bytes  │ codec bytes│
//! └────────────┴────────────┴──────────────┴────────────┘
//! ```
//!
//! The prefix keeps framing independent of the codec: a body that nobody
//! wants is skipped by length without being decoded.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Prefix size in bytes (fixed, exactly 8).
pub const PREFIX_SIZE: usize = 8;

/// Maximum encoded header size (64 KB).
pub const MAX_HEADER_SIZE: u32 = 64 * 1024;

/// Default maximum encoded body size (64 MB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Length prefix preceding every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrefix {
    /// Encoded header length in bytes.
    pub header_length: u32,
    /// Encoded body length in bytes.
    pub body_length: u32,
}

impl FramePrefix {
    /// Create a new prefix.
    pub fn new(header_length: u32, body_length: u32) -> Self {
        Self {
            header_length,
            body_length,
        }
    }

    /// Prefix for parts of the given lengths, checked against the limits.
    ///
    /// Lengths that do not fit in a `u32` are rejected instead of truncated.
    ///
    /// # Example
    ///
    /// ```
    /// use tinyrpc::protocol::{FramePrefix, DEFAULT_MAX_BODY_SIZE};
    ///
    /// assert!(FramePrefix::for_parts(12, 3, DEFAULT_MAX_BODY_SIZE).is_ok());
    /// assert!(FramePrefix::for_parts(12, 101, 100).is_err());
    /// ```
    pub fn for_parts(header_len: usize, body_len: usize, max_body_size: u32) -> Result<Self> {
        let header_length = u32::try_from(header_len).map_err(|_| {
            RpcError::Framing(format!(
                "header size {} exceeds maximum {}",
                header_len, MAX_HEADER_SIZE
            ))
        })?;
        let body_length = u32::try_from(body_len).map_err(|_| {
            RpcError::Framing(format!(
                "body size {} exceeds maximum {}",
                body_len, max_body_size
            ))
        })?;

        let prefix = Self::new(header_length, body_length);
        prefix.validate(max_body_size)?;
        Ok(prefix)
    }

    /// Encode prefix to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use tinyrpc::protocol::FramePrefix;
    ///
    /// let bytes = FramePrefix::new(12, 3).encode();
    /// assert_eq!(bytes, [0, 0, 0, 12, 0, 0, 0, 3]);
    /// ```
    pub fn encode(&self) -> [u8; PREFIX_SIZE] {
        let mut buf = [0u8; PREFIX_SIZE];
        buf[0..4].copy_from_slice(&self.header_length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.body_length.to_be_bytes());
        buf
    }

    /// Decode prefix from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PREFIX_SIZE {
            return None;
        }
        Some(Self {
            header_length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            body_length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Validate the prefix against size limits.
    ///
    /// A frame must carry a header; the body may be empty.
    pub fn validate(&self, max_body_size: u32) -> Result<()> {
        if self.header_length == 0 {
            return Err(RpcError::Framing("frame has an empty header".to_string()));
        }

        if self.header_length > MAX_HEADER_SIZE {
            return Err(RpcError::Framing(format!(
                "header size {} exceeds maximum {}",
                self.header_length, MAX_HEADER_SIZE
            )));
        }

        if self.body_length > max_body_size {
            return Err(RpcError::Framing(format!(
                "body size {} exceeds maximum {}",
                self.body_length, max_body_size
            )));
        }

        Ok(())
    }

    /// Total frame size including the prefix.
    #[inline]
    pub fn frame_size(&self) -> usize {
        PREFIX_SIZE + self.header_length as usize + self.body_length as usize
    }
}

/// Per-call header, encoded with the connection's codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Target in `Service.Method` form.
    pub service_method: String,
    /// Sequence number chosen by the client.
    pub seq: u64,
    /// Error reported by the server; empty on success.
    #[serde(default)]
    pub error: String,
}

impl Header {
    /// Create a request header.
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Turn this header into an error response header.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Check if this header carries an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
