//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the per-call framing of a connection:
//! - 8-byte length prefix encoding/decoding
//! - Codec-encoded [`Header`] (`Service.Method`, sequence, error)
//! - Frame buffer for accumulating partial reads
//! - Async [`FrameReader`] for lines and frames over one stream

mod frame;
mod frame_buffer;
mod reader;
mod wire_format;

pub use frame::{build_frame, encode_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use reader::FrameReader;
pub use wire_format::{FramePrefix, Header, DEFAULT_MAX_BODY_SIZE, MAX_HEADER_SIZE, PREFIX_SIZE};
