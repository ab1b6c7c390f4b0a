//! JSON codec using `serde_json`.

use crate::error::Result;

/// JSON codec. Slower than MsgPack but readable on the wire.
pub struct JsonCodec;

impl JsonCodec {
    /// Identifier carried in the handshake.
    pub const ID: &'static str = "application/json";

    /// Encode a value to JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_encodes_as_null() {
        assert_eq!(JsonCodec::encode(&()).unwrap(), b"null");
    }

    #[test]
    fn test_decode_into_wrong_type_fails() {
        let encoded = JsonCodec::encode(&"seven").unwrap();
        let result: Result<i64> = JsonCodec::decode(&encoded);
        assert!(result.is_err());
    }
}
