//! Control plane module - connection options handshake.
//!
//! The control plane is JSON: one options line per connection. After the
//! handshake, all communication is codec-encoded frames (see
//! [`crate::protocol`]).
//!
//! # Workflow
//!
//! 1. Dialer connects the transport (optionally through an HTTP tunnel)
//! 2. Dialer sends [`ConnectionOptions`] as a JSON line
//! 3. Acceptor checks the magic number and codec
//! 4. Frames flow in both directions with the negotiated codec

mod handshake;
mod options;

pub use handshake::{receive_options, send_options, write_line};
pub use options::{ConnectionOptions, DEFAULT_CONNECT_TIMEOUT, MAGIC_NUMBER, MAX_OPTIONS_LINE};
