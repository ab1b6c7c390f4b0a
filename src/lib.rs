//! # tinyrpc
//!
//! Lightweight RPC runtime over byte streams.
//!
//! A client multiplexes many concurrent calls over one connection. A server
//! dispatches `Service.Method` requests to typed handlers registered at
//! startup. An [`XClient`] spreads calls over a discovered set of servers
//! with random or round-robin selection, or broadcasts to all of them.
//!
//! ## Architecture
//!
//! - **Handshake**: one JSON options line per connection (magic number,
//!   codec, timeouts)
//! - **Frames**: length prefix + codec-encoded header + codec-encoded body
//! - **Transports**: TCP, Unix sockets, TCP behind an HTTP `CONNECT` tunnel
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tinyrpc::{Client, ConnectionOptions, Server, Service};
//!
//! struct Foo;
//!
//! #[tokio::main]
//! async fn main() -> tinyrpc::Result<()> {
//!     let server = Server::new();
//!     server.register(
//!         Service::builder(Foo)
//!             .method("Sum", |_: Arc<Foo>, (a, b): (i32, i32)| async move { Ok::<_, String>(a + b) }),
//!     )?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//!     let addr = format!("tcp@{}", listener.local_addr()?);
//!     tokio::spawn(async move { server.accept(listener).await });
//!
//!     let client = Client::xdial(&addr, ConnectionOptions::default()).await?;
//!     let sum: i32 = client.call("Foo.Sum", &(3, 4)).await?;
//!     assert_eq!(sum, 7);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod transport;
pub mod xclient;

mod client;
mod server;
mod writer;

pub use client::{Call, Client};
pub use codec::CodecType;
pub use control::ConnectionOptions;
pub use error::{Result, RpcError};
pub use server::{Server, ServerConfig, DEFAULT_MAX_CONCURRENT_CALLS};
pub use service::Service;
pub use writer::WriterConfig;
pub use xclient::{Discovery, MultiServersDiscovery, RegistryDiscovery, SelectMode, XClient};
