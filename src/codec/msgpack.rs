//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs travel as maps keyed by field name.

use crate::error::Result;

/// MessagePack codec, the default body codec.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Identifier carried in the handshake.
    pub const ID: &'static str = "application/msgpack";

    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
