//! Typed methods erased behind the [`Handler`] trait.
//!
//! A method has one calling convention: one argument, one reply, one error.
//! [`TypedHandler`] enforces it at compile time and turns the method into a
//! closure of fixed shape `(encoded args) -> future of (encoded reply)`.

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::CodecType;
use crate::error::{Result, RpcError};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased method entry point.
pub trait Handler: Send + Sync + 'static {
    /// Decode the argument from `body` and start the call.
    ///
    /// Decoding happens before the future is returned so a bad argument is
    /// reported without spawning anything.
    fn call(&self, codec: CodecType, body: &[u8]) -> Result<BoxFuture<'static, Result<Bytes>>>;
}

/// Wrapper that decodes the argument, runs the method on its receiver and
/// encodes the reply.
pub struct TypedHandler<S, F, A, R, E, Fut> {
    receiver: Arc<S>,
    handler: F,
    _phantom: PhantomData<fn(A) -> (Fut, R, E)>,
}

impl<S, F, A, R, E, Fut> TypedHandler<S, F, A, R, E, Fut> {
    /// Create a new typed handler bound to `receiver`.
    pub fn new(receiver: Arc<S>, handler: F) -> Self {
        Self {
            receiver,
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<S, F, A, R, E, Fut> Handler for TypedHandler<S, F, A, R, E, Fut>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    fn call(&self, codec: CodecType, body: &[u8]) -> Result<BoxFuture<'static, Result<Bytes>>> {
        let args: A = codec
            .decode(body)
            .map_err(|e| RpcError::Body(e.to_string()))?;

        let fut = (self.handler)(self.receiver.clone(), args);
        Ok(Box::pin(async move {
            let reply = fut.await.map_err(|e| RpcError::Handler(e.to_string()))?;
            Ok(Bytes::from(codec.encode(&reply)?))
        }))
    }
}

/// A registered method with its invocation counter.
pub struct MethodType {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    handler: Box<dyn Handler>,
    num_calls: AtomicU64,
}

impl MethodType {
    pub(crate) fn new(
        name: String,
        arg_type: &'static str,
        reply_type: &'static str,
        handler: Box<dyn Handler>,
    ) -> Self {
        Self {
            name,
            arg_type,
            reply_type,
            handler,
            num_calls: AtomicU64::new(0),
        }
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared argument type.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Declared reply type.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Number of invocations so far.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decode the argument and start the call, counting the invocation.
    pub(crate) fn invoke(
        &self,
        codec: CodecType,
        body: &[u8],
    ) -> Result<BoxFuture<'static, Result<Bytes>>> {
        let fut = self.handler.call(codec, body)?;
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        Ok(fut)
    }
}

impl std::fmt::Debug for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodType")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}
