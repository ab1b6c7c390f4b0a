//! Connection options block.
//!
//! Sent once per connection, as a single JSON line, before any frame:
//!
//! ```text
//! {"magicNumber":3927900,"codecID":"application/msgpack","connectTimeout":10000,"handleTimeout":0}
//! ```
//!
//! Durations travel as whole milliseconds; zero means unbounded.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tinyrpc::codec::CodecType;
//! use tinyrpc::control::ConnectionOptions;
//!
//! let opts = ConnectionOptions::default()
//!     .with_codec(CodecType::Json)
//!     .with_handle_timeout(Duration::from_secs(1));
//!
//! let line = opts.to_json_line().unwrap();
//! let parsed = ConnectionOptions::from_json_line(line.trim_end().as_bytes()).unwrap();
//! assert_eq!(parsed, opts);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::CodecType;
use crate::error::{Result, RpcError};

/// Sentinel marking a tinyrpc connection.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// Maximum length of the options line.
pub const MAX_OPTIONS_LINE: usize = 4096;

/// Default connect timeout (dial + handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection options negotiated at handshake time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Must equal [`MAGIC_NUMBER`].
    pub magic_number: u32,
    /// Codec for headers and bodies on this connection.
    #[serde(rename = "codecID")]
    pub codec: CodecType,
    /// Budget for dial + handshake; zero is unbounded.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Server-side budget per call; zero is unbounded.
    #[serde(with = "duration_ms")]
    pub handle_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec: CodecType::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl ConnectionOptions {
    /// Set the codec.
    pub fn with_codec(mut self, codec: CodecType) -> Self {
        self.codec = codec;
        self
    }

    /// Set the connect timeout (zero is unbounded).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handle timeout (zero is unbounded).
    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Check the magic number.
    pub fn validate(&self) -> Result<()> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(RpcError::Protocol(format!(
                "invalid magic number {:x}",
                self.magic_number
            )));
        }
        Ok(())
    }

    /// Serialize as one `\n`-terminated JSON line.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse and validate an options line (terminator already stripped).
    ///
    /// Any failure is a [`RpcError::Protocol`] error: the connection must be
    /// closed without reading frames.
    pub fn from_json_line(line: &[u8]) -> Result<Self> {
        let opts: ConnectionOptions = serde_json::from_slice(line)
            .map_err(|e| RpcError::Protocol(format!("options error: {}", e)))?;
        opts.validate()?;
        Ok(opts)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
