//! Frame struct with typed accessors.
//!
//! A [`Frame`] holds the still-encoded header and body of one call.
//! Uses `bytes::Bytes` so the body can be handed to the caller without
//! copying.
//!
//! # Example
//!
//! ```
//! use tinyrpc::codec::CodecType;
//! use tinyrpc::protocol::{encode_frame, FrameBuffer, Header};
//!
//! let bytes = encode_frame(CodecType::MsgPack, &Header::new("Foo.Sum", 1), &(3, 4)).unwrap();
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&bytes).unwrap();
//!
//! let header = frames[0].decode_header(CodecType::MsgPack).unwrap();
//! assert_eq!(header.service_method, "Foo.Sum");
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::wire_format::{FramePrefix, Header, DEFAULT_MAX_BODY_SIZE};
use crate::codec::CodecType;
use crate::error::{Result, RpcError};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded header bytes.
    pub header: Bytes,
    /// Encoded body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from encoded header and body.
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Decode the header with the connection's codec.
    ///
    /// An undecodable header leaves the stream position unknown to the
    /// peer's logic, so it is reported as a framing error.
    pub fn decode_header(&self, codec: CodecType) -> Result<Header> {
        codec
            .decode(&self.header)
            .map_err(|e| RpcError::Framing(format!("read header: {}", e)))
    }

    /// Decode the body into `T`.
    pub fn decode_body<T: DeserializeOwned>(&self, codec: CodecType) -> Result<T> {
        codec.decode(&self.body)
    }
}

/// Build a complete frame from already-encoded header and body.
///
/// Fails with a framing error if either part exceeds the default limits.
///
/// # Example
///
/// ```
/// use tinyrpc::protocol::{build_frame, PREFIX_SIZE};
///
/// let bytes = build_frame(b"head", b"body").unwrap();
/// assert_eq!(bytes.len(), PREFIX_SIZE + 8);
/// ```
pub fn build_frame(header: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let prefix = FramePrefix::for_parts(header.len(), body.len(), DEFAULT_MAX_BODY_SIZE)?;
    let mut buf = Vec::with_capacity(prefix.frame_size());
    buf.extend_from_slice(&prefix.encode());
    buf.extend_from_slice(header);
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Encode header and body with `codec` and build a complete frame.
pub fn encode_frame<T: Serialize + ?Sized>(
    codec: CodecType,
    header: &Header,
    body: &T,
) -> Result<Vec<u8>> {
    let header = codec.encode(header)?;
    let body = codec.encode(body)?;
    build_frame(&header, &body)
}

/// Split a built frame back into prefix and parts (test helper).
#[cfg(test)]
pub(crate) fn split_frame(bytes: &[u8]) -> (FramePrefix, &[u8], &[u8]) {
    use super::wire_format::PREFIX_SIZE;

    let prefix = FramePrefix::decode(bytes).unwrap();
    let header_end = PREFIX_SIZE + prefix.header_length as usize;
    (
        prefix,
        &bytes[PREFIX_SIZE..header_end],
        &bytes[header_end..prefix.frame_size()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PREFIX_SIZE;

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(b"hdr", b"hello").unwrap();
        let (prefix, header, body) = split_frame(&bytes);

        assert_eq!(prefix, FramePrefix::new(3, 5));
        assert_eq!(header, b"hdr");
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_build_frame_empty_body() {
        let bytes = build_frame(b"hdr", b"").unwrap();
        assert_eq!(bytes.len(), PREFIX_SIZE + 3);
    }

    #[test]
    fn test_encode_frame_decodes_back() {
        for codec in [CodecType::MsgPack, CodecType::Json] {
            let header = Header::new("Foo.Sum", 9);
            let bytes = encode_frame(codec, &header, &vec![1u32, 2]).unwrap();
            let (_, h, b) = split_frame(&bytes);

            let frame = Frame::new(Bytes::copy_from_slice(h), Bytes::copy_from_slice(b));
            assert_eq!(frame.decode_header(codec).unwrap(), header);
            assert_eq!(frame.decode_body::<Vec<u32>>(codec).unwrap(), vec![1, 2]);
        }
    }

    #[test]
    fn test_bad_header_is_framing_error() {
        let frame = Frame::new(Bytes::from_static(b"\xc1\xc1"), Bytes::new());
        let err = frame.decode_header(CodecType::MsgPack).unwrap_err();
        assert!(matches!(err, RpcError::Framing(_)));
    }
}
