//! Error types for tinyrpc.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all tinyrpc operations.
///
/// Connection-fatal variants (`Protocol`, `Framing`, `Io`) stay local to the
/// connection that produced them. Per-call variants (`Dispatch`, `Handler`,
/// `Timeout`, `Remote`) always travel back to the specific caller.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Handshake failure: bad magic number, unknown codec, bad tunnel reply.
    #[error("rpc protocol: {0}")]
    Protocol(String),

    /// Malformed or oversized frame. Terminates the read loop.
    #[error("rpc framing: {0}")]
    Framing(String),

    /// Unknown service or method, or an ill-formed `Service.Method` name.
    #[error("rpc server: {0}")]
    Dispatch(String),

    /// A registered method returned an error.
    #[error("{0}")]
    Handler(String),

    /// Handle or connect budget exceeded.
    #[error("rpc: {0}")]
    Timeout(String),

    /// Error string reported by the remote peer in the response header.
    #[error("{0}")]
    Remote(String),

    /// Body could not be decoded into the declared argument or reply type.
    #[error("reading body: {0}")]
    Body(String),

    /// Connection closed locally or remotely.
    #[error("connection is shut down")]
    Shutdown,

    /// Caller abandoned the call before a response arrived.
    #[error("rpc client: call failed: {0}")]
    Cancelled(String),

    /// No servers, unsupported select mode, bad address format.
    #[error("rpc discovery: {0}")]
    Discovery(String),

    /// A service with the same name is already registered.
    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    /// A service or method name cannot be addressed as `Service.Method`.
    #[error("rpc: invalid service: {0}")]
    InvalidService(String),

    /// Registry endpoint failure.
    #[error("rpc registry: {0}")]
    Http(String),
}

impl RpcError {
    /// Timeout error for a handler exceeding its budget.
    pub(crate) fn handle_timeout(budget: Duration) -> Self {
        RpcError::Timeout(format!("request handle timeout: expect within {:?}", budget))
    }

    /// Timeout error for dial + handshake exceeding its budget.
    pub(crate) fn connect_timeout(budget: Duration) -> Self {
        RpcError::Timeout(format!("connect timeout: expect within {:?}", budget))
    }

    /// Whether this error means the connection is unusable.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, RpcError::Shutdown)
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Http(e.to_string())
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
