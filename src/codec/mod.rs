//! Codec module - serialization for frame headers and bodies.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (default)
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Design
//!
//! Codecs are marker structs with static methods. The codec of a connection
//! is chosen at handshake time by identifier, so [`CodecType`] dispatches to
//! the marker structs by `match` instead of through a trait object (generic
//! `encode<T>` cannot live behind `dyn`).
//!
//! # Example
//!
//! ```
//! use tinyrpc::codec::CodecType;
//!
//! let codec = CodecType::from_id("application/json").unwrap();
//! let bytes = codec.encode(&7u32).unwrap();
//! let value: u32 = codec.decode(&bytes).unwrap();
//! assert_eq!(value, 7);
//! ```

mod json;
mod msgpack;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use crate::error::Result;

/// Codec negotiated for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CodecType {
    /// `application/msgpack`
    #[default]
    MsgPack,
    /// `application/json`
    Json,
}

impl CodecType {
    /// Wire identifier of this codec.
    pub const fn id(&self) -> &'static str {
        match self {
            CodecType::MsgPack => MsgPackCodec::ID,
            CodecType::Json => JsonCodec::ID,
        }
    }

    /// Look up a codec by wire identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            MsgPackCodec::ID => Some(CodecType::MsgPack),
            JsonCodec::ID => Some(CodecType::Json),
            _ => None,
        }
    }

    /// Encode a value with this codec.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecType::MsgPack => MsgPackCodec::encode(value),
            CodecType::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value with this codec.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            CodecType::MsgPack => MsgPackCodec::decode(bytes),
            CodecType::Json => JsonCodec::decode(bytes),
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl TryFrom<String> for CodecType {
    type Error = String;

    fn try_from(id: String) -> std::result::Result<Self, Self::Error> {
        CodecType::from_id(&id).ok_or_else(|| format!("invalid codec type {}", id))
    }
}

impl From<CodecType> for String {
    fn from(codec: CodecType) -> Self {
        codec.id().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        for codec in [CodecType::MsgPack, CodecType::Json] {
            assert_eq!(CodecType::from_id(codec.id()), Some(codec));
        }
        assert_eq!(CodecType::from_id("application/gob"), None);
    }

    #[test]
    fn test_default_is_msgpack() {
        assert_eq!(CodecType::default(), CodecType::MsgPack);
    }

    #[test]
    fn test_serde_uses_identifier() {
        let json = serde_json::to_string(&CodecType::Json).unwrap();
        assert_eq!(json, "\"application/json\"");

        let err = serde_json::from_str::<CodecType>("\"application/gob\"").unwrap_err();
        assert!(err.to_string().contains("invalid codec type application/gob"));
    }

    #[test]
    fn test_dispatch_matches_marker_structs() {
        let value = vec![1u8, 2, 3];
        assert_eq!(
            CodecType::MsgPack.encode(&value).unwrap(),
            MsgPackCodec::encode(&value).unwrap()
        );
        assert_eq!(
            CodecType::Json.encode(&value).unwrap(),
            JsonCodec::encode(&value).unwrap()
        );
    }
}
