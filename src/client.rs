//! Multiplexing RPC client.
//!
//! One connection carries many outstanding calls. Each call is registered
//! in a pending table under a fresh sequence number, queued to the
//! connection's writer task under the send lock, and completed by the
//! single receive task when the response with the same sequence number
//! arrives. A caller that gives up never leaves a partial frame behind:
//! the writer task owns the socket and only writes whole frames.
//!
//! # Example
//!
//! ```no_run
//! use tinyrpc::{Client, ConnectionOptions};
//!
//! #[tokio::main]
//! async fn main() -> tinyrpc::Result<()> {
//!     let client = Client::xdial("tcp@127.0.0.1:9999", ConnectionOptions::default()).await?;
//!
//!     let sum: i32 = client.call("Foo.Sum", &(3, 4)).await?;
//!     assert_eq!(sum, 7);
//!
//!     let pending = client.go::<_, i32>("Foo.Sum", &(1, 2)).await;
//!     println!("seq {} -> {}", pending.seq(), pending.done().await?);
//!
//!     client.close().await
//! }
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::CodecType;
use crate::control::{send_options, ConnectionOptions, MAGIC_NUMBER};
use crate::error::{Result, RpcError};
use crate::protocol::{FrameReader, Header};
use crate::transport::http::connect_tunnel;
use crate::transport::{self, split_boxed, BoxedReader, BoxedWriter, Protocol, RpcAddr};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

type ReplySender = oneshot::Sender<Result<Bytes>>;

/// A call registered on the connection and waiting for its response.
struct PendingCall {
    service_method: String,
    tx: ReplySender,
}

struct ClientState {
    seq: u64,
    pending: HashMap<u64, PendingCall>,
    /// Set by [`Client::close`].
    closing: bool,
    /// Set when the receive loop ends.
    shutdown: bool,
}

struct ClientInner {
    options: ConnectionOptions,
    /// Queue of the writer task; `None` once closed.
    sending: tokio::sync::Mutex<Option<WriterHandle>>,
    state: Mutex<ClientState>,
}

impl ClientInner {
    fn remove_call(&self, seq: u64) -> Option<PendingCall> {
        self.state.lock().pending.remove(&seq)
    }

    /// Mark the connection dead and fail everything still pending.
    fn terminate_calls(&self) {
        let pending: Vec<PendingCall> = {
            let mut state = self.state.lock();
            state.shutdown = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };
        for call in pending {
            debug!(service_method = %call.service_method, "rpc client: failing pending call");
            let _ = call.tx.send(Err(RpcError::Shutdown));
        }
    }
}

/// Removes a registered call if the send is abandoned before the frame is
/// queued.
struct Registration<'a> {
    inner: &'a ClientInner,
    seq: u64,
    armed: bool,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.remove_call(self.seq);
        }
    }
}

/// Handle to one outstanding call.
///
/// Dropping it removes the call from the pending table; a late response
/// is discarded by the receive loop.
pub struct Call<R> {
    seq: u64,
    service_method: String,
    codec: CodecType,
    rx: oneshot::Receiver<Result<Bytes>>,
    inner: Weak<ClientInner>,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Drop for Call<R> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove_call(self.seq);
        }
    }
}

impl<R: DeserializeOwned> Call<R> {
    /// Sequence number on the wire, or 0 if the call was never registered.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Wait for the reply.
    pub async fn done(mut self) -> Result<R> {
        let body = (&mut self.rx).await.map_err(|_| RpcError::Shutdown)??;
        self.codec
            .decode(&body)
            .map_err(|e| RpcError::Body(e.to_string()))
    }
}

/// An RPC client bound to one connection.
pub struct Client {
    inner: Arc<ClientInner>,
    receiver: JoinHandle<()>,
}

impl Client {
    /// Dial `network` (`tcp` or `unix`) at `address`.
    pub async fn dial(network: &str, address: &str, options: ConnectionOptions) -> Result<Self> {
        Self::dial_addr(RpcAddr::new(network.parse()?, address), options).await
    }

    /// Dial `address` over TCP through an HTTP `CONNECT` tunnel.
    pub async fn dial_http(address: &str, options: ConnectionOptions) -> Result<Self> {
        Self::dial_addr(RpcAddr::new(Protocol::Http, address), options).await
    }

    /// Dial a `protocol@address` string (`tcp@`, `unix@` or `http@`).
    pub async fn xdial(rpc_addr: &str, options: ConnectionOptions) -> Result<Self> {
        Self::dial_addr(rpc_addr.parse()?, options).await
    }

    /// Dial a parsed address.
    ///
    /// The connect timeout covers connecting, the tunnel exchange and the
    /// options handshake.
    pub async fn dial_addr(addr: RpcAddr, options: ConnectionOptions) -> Result<Self> {
        let budget = options.connect_timeout;
        let connect = async move {
            let (reader, mut writer) = transport::connect(&addr).await?;
            let mut reader = FrameReader::new(reader);
            if addr.protocol == Protocol::Http {
                connect_tunnel(&mut reader, &mut writer).await?;
            }
            Self::handshake(reader, writer, options).await
        };

        if budget.is_zero() {
            return connect.await;
        }
        tokio::time::timeout(budget, connect)
            .await
            .map_err(|_| RpcError::connect_timeout(budget))?
    }

    /// Run a client over an already connected stream.
    pub async fn from_stream<S>(stream: S, options: ConnectionOptions) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = split_boxed(stream);
        Self::handshake(FrameReader::new(reader), writer, options).await
    }

    async fn handshake(
        reader: FrameReader<BoxedReader>,
        mut writer: BoxedWriter,
        mut options: ConnectionOptions,
    ) -> Result<Self> {
        options.magic_number = MAGIC_NUMBER;
        send_options(&mut writer, &options).await?;

        let (writer, writer_task) = spawn_writer_task(writer, WriterConfig::default());
        let inner = Arc::new(ClientInner {
            options,
            sending: tokio::sync::Mutex::new(Some(writer)),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });
        let receiver = tokio::spawn(receive_loop(inner.clone(), reader));
        tokio::spawn(watch_writer(Arc::downgrade(&inner), writer_task));

        Ok(Self { inner, receiver })
    }

    /// Options sent at handshake time.
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Whether the client can still send calls.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closing && !state.shutdown
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Start a call and return its handle once the request is written.
    ///
    /// Failures before or during the write complete the handle with the
    /// error.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        let seq = self.send(service_method, args, tx).await;
        Call {
            seq,
            service_method: service_method.to_string(),
            codec: self.inner.options.codec,
            rx,
            inner: Arc::downgrade(&self.inner),
            _reply: PhantomData,
        }
    }

    /// Call and wait for the reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await.done().await
    }

    /// Call, giving up when `token` is cancelled.
    ///
    /// Cancellation is local: the call is dropped from the pending table and
    /// a late response is discarded.
    pub async fn call_with_cancel<A, R>(
        &self,
        token: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        if token.is_cancelled() {
            return Err(RpcError::Cancelled("call cancelled".to_string()));
        }

        tokio::select! {
            result = self.call(service_method, args) => result,
            _ = token.cancelled() => Err(RpcError::Cancelled("call cancelled".to_string())),
        }
    }

    /// Close the connection.
    ///
    /// Pending calls fail with [`RpcError::Shutdown`]. Frames already queued
    /// are flushed before the write half shuts down. Closing twice is an
    /// error.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.closing {
                return Err(RpcError::Shutdown);
            }
            state.closing = true;
        }

        self.receiver.abort();
        self.inner.terminate_calls();

        // the writer task drains its queue and shuts the write half down
        self.inner.sending.lock().await.take();
        Ok(())
    }

    async fn send<A>(&self, service_method: &str, args: &A, tx: ReplySender) -> u64
    where
        A: Serialize + ?Sized,
    {
        let codec = self.inner.options.codec;
        let body = match codec.encode(args) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                let _ = tx.send(Err(e));
                return 0;
            }
        };

        let sending = self.inner.sending.lock().await;
        let writer = match sending.as_ref() {
            Some(writer) => writer,
            None => {
                let _ = tx.send(Err(RpcError::Shutdown));
                return 0;
            }
        };

        let seq = {
            let mut state = self.inner.state.lock();
            if state.closing || state.shutdown {
                drop(state);
                let _ = tx.send(Err(RpcError::Shutdown));
                return 0;
            }
            let seq = state.seq;
            state.seq += 1;
            state.pending.insert(
                seq,
                PendingCall {
                    service_method: service_method.to_string(),
                    tx,
                },
            );
            seq
        };
        let mut registration = Registration {
            inner: self.inner.as_ref(),
            seq,
            armed: true,
        };

        let queued = match codec.encode(&Header::new(service_method, seq)) {
            Ok(header) => match OutboundFrame::new(Bytes::from(header), body) {
                Ok(frame) => writer.send(frame).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        registration.armed = false;

        if let Err(e) = queued {
            if let Some(call) = self.inner.remove_call(seq) {
                let _ = call.tx.send(Err(e));
            }
        }
        seq
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Route responses to pending calls until the connection ends.
async fn receive_loop(inner: Arc<ClientInner>, mut reader: FrameReader<BoxedReader>) {
    let codec = inner.options.codec;
    let err = loop {
        let frame = match reader.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break RpcError::Shutdown,
            Err(e) => break e,
        };
        let header = match frame.decode_header(codec) {
            Ok(header) => header,
            Err(e) => break e,
        };

        match inner.remove_call(header.seq) {
            None => debug!(seq = header.seq, "rpc client: discarding response with no pending call"),
            Some(call) if header.is_error() => {
                let _ = call.tx.send(Err(RpcError::Remote(header.error)));
            }
            Some(call) => {
                let _ = call.tx.send(Ok(frame.body));
            }
        }
    };

    debug!("rpc client: receive loop ended: {}", err);
    inner.terminate_calls();
}

/// Fail pending calls if the writer task dies on a write error.
async fn watch_writer(inner: Weak<ClientInner>, writer_task: JoinHandle<Result<()>>) {
    let err = match writer_task.await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };
    warn!("rpc client: writer task ended: {}", err);
    if let Some(inner) = inner.upgrade() {
        inner.terminate_calls();
    }
}
