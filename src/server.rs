//! Server runtime: accept loops, handshake and per-connection dispatch.
//!
//! Each connection goes through:
//! 1. Optional HTTP `CONNECT` exchange
//! 2. Options handshake (magic number, codec, handle timeout)
//! 3. Read loop: decode header, resolve `Service.Method`, decode the
//!    argument, spawn the call
//! 4. Drain: wait for in-flight calls, flush the writer, close
//!
//! Calls of one connection run concurrently, bounded by a semaphore. All
//! responses go through one writer task so frames never interleave.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tinyrpc::{Server, Service};
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
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await?;
//!     server.accept(listener).await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::codec::CodecType;
use crate::control::receive_options;
use crate::error::{Result, RpcError};
use crate::protocol::{FrameReader, Header, DEFAULT_MAX_BODY_SIZE};
use crate::service::{BoxFuture, Service, ServiceRegistry};
use crate::transport::http::accept_tunnel;
#[cfg(unix)]
use crate::transport::UnixSocketListener;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default maximum concurrent calls per connection.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 256;

/// Server tuning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Calls running at once on one connection; the read loop waits when
    /// the limit is reached. Values below 1 count as 1.
    pub max_concurrent_calls: usize,
    /// Largest accepted request body.
    pub max_body_size: u32,
    /// Response writer settings.
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the per-connection call limit, at least 1.
    pub fn with_max_concurrent_calls(mut self, limit: usize) -> Self {
        self.max_concurrent_calls = limit.max(1);
        self
    }

    /// Set the largest accepted request body.
    pub fn with_max_body_size(mut self, size: u32) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set the response channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.writer.channel_capacity = capacity;
        self
    }
}

/// An RPC server. Cheap to clone; clones share the service table.
#[derive(Clone, Default)]
pub struct Server {
    inner: Arc<ServerInner>,
}

#[derive(Default)]
struct ServerInner {
    registry: ServiceRegistry,
    config: ServerConfig,
}

impl Server {
    /// Create a server with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server with custom settings.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                registry: ServiceRegistry::new(),
                config,
            }),
        }
    }

    /// Publish a service.
    pub fn register(&self, service: impl Into<Service>) -> Result<()> {
        self.inner.registry.register(service.into())
    }

    /// The service table.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    /// Invocation count of `Service.Method`, if registered.
    pub fn num_calls(&self, service_method: &str) -> Option<u64> {
        self.inner.registry.num_calls(service_method)
    }

    /// Accept TCP connections forever, serving each in its own task.
    pub async fn accept(&self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("rpc server: accepting on tcp@{}", addr);
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "rpc server: accepted connection");
                    let _ = stream.set_nodelay(true);
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(e) => warn!("rpc server: accept error: {}", e),
            }
        }
    }

    /// Accept Unix socket connections forever.
    #[cfg(unix)]
    pub async fn accept_unix(&self, listener: UnixSocketListener) {
        info!("rpc server: accepting on {}", listener.rpc_addr());
        loop {
            match listener.accept().await {
                Ok(stream) => {
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(e) => warn!("rpc server: accept error: {}", e),
            }
        }
    }

    /// Accept TCP connections that open with an HTTP `CONNECT` tunnel.
    pub async fn accept_http(&self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("rpc server: accepting on http@{}", addr);
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "rpc server: accepted http connection");
                    let _ = stream.set_nodelay(true);
                    let server = self.clone();
                    tokio::spawn(async move { server.serve_http_conn(stream).await });
                }
                Err(e) => warn!("rpc server: accept error: {}", e),
            }
        }
    }

    /// Serve one connection until the peer closes it or it breaks.
    pub async fn serve_conn<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let reader = FrameReader::with_max_body(reader, self.inner.config.max_body_size);
        self.serve_split(reader, writer).await;
    }

    /// Serve one connection that starts with an HTTP `CONNECT` request.
    pub async fn serve_http_conn<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = FrameReader::with_max_body(reader, self.inner.config.max_body_size);
        if let Err(e) = accept_tunnel(&mut reader, &mut writer).await {
            warn!("rpc server: http tunnel: {}", e);
            return;
        }
        self.serve_split(reader, writer).await;
    }

    async fn serve_split<R, W>(&self, mut reader: FrameReader<R>, writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let opts = match receive_options(&mut reader).await {
            Ok(opts) => opts,
            Err(e) => {
                warn!("rpc server: options error: {}", e);
                return;
            }
        };

        let codec = opts.codec;
        let handle_timeout = opts.handle_timeout;
        let config = &self.inner.config;
        let (writer, writer_task) = spawn_writer_task(writer, config.writer.clone());
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        let mut calls = JoinSet::new();

        loop {
            let frame = match reader.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!("rpc server: read frame: {}", e);
                    break;
                }
            };

            let header = match frame.decode_header(codec) {
                Ok(header) => header,
                Err(e) => {
                    warn!("rpc server: {}", e);
                    break;
                }
            };

            let call = self
                .inner
                .registry
                .find_service(&header.service_method)
                .and_then(|(_, method)| method.invoke(codec, &frame.body));
            let call = match call {
                Ok(call) => call,
                Err(e) => {
                    debug!(
                        service_method = %header.service_method,
                        seq = header.seq,
                        "rpc server: rejecting call: {}",
                        e
                    );
                    send_response(&writer, codec, header, Err(e)).await;
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let writer = writer.clone();
            calls.spawn(async move {
                let _permit = permit;
                let result = run_call(call, handle_timeout, &header).await;
                send_response(&writer, codec, header, result).await;
            });

            while calls.try_join_next().is_some() {}
        }

        while calls.join_next().await.is_some() {}
        drop(writer);

        match writer_task.await {
            Ok(Ok(())) => debug!("rpc server: connection drained"),
            Ok(Err(e)) => error!("rpc server: writer task: {}", e),
            Err(e) => error!("rpc server: writer task panicked: {}", e),
        }
    }
}

/// Run a call in its own task, racing it against the handle timeout.
///
/// A call that loses the race keeps running detached; its result is only
/// logged.
async fn run_call(
    call: BoxFuture<'static, Result<Bytes>>,
    handle_timeout: Duration,
    header: &Header,
) -> Result<Bytes> {
    let mut task = tokio::spawn(call);

    if handle_timeout.is_zero() {
        return task.await.map_err(join_error)?;
    }

    match tokio::time::timeout(handle_timeout, &mut task).await {
        Ok(joined) => joined.map_err(join_error)?,
        Err(_) => {
            let service_method = header.service_method.clone();
            let seq = header.seq;
            tokio::spawn(async move {
                let ok = matches!(task.await, Ok(Ok(_)));
                debug!(%service_method, seq, ok, "rpc server: discarded result of timed-out call");
            });
            Err(RpcError::handle_timeout(handle_timeout))
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> RpcError {
    RpcError::Handler(format!("rpc server: call aborted: {}", e))
}

/// Queue a response; errors travel in the header with a unit body.
///
/// A reply too large to frame is turned into an error response so only
/// that caller fails.
async fn send_response(
    writer: &WriterHandle,
    codec: CodecType,
    header: Header,
    result: Result<Bytes>,
) {
    let reply = result.and_then(|body| {
        let encoded = codec.encode(&header)?;
        OutboundFrame::new(Bytes::from(encoded), body)
    });
    let frame = match reply {
        Ok(frame) => Ok(frame),
        Err(e) => OutboundFrame::encode(codec, &header.with_error(e.to_string()), &()),
    };

    match frame {
        Ok(frame) => {
            if let Err(e) = writer.send(frame).await {
                debug!("rpc server: write response: {}", e);
            }
        }
        Err(e) => error!("rpc server: encode response: {}", e),
    }
}
