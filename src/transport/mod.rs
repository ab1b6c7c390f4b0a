//! Transport module - addressing and stream setup.
//!
//! Provides:
//! - `protocol@address` parsing ([`RpcAddr`])
//! - TCP and Unix domain socket dialing
//! - Unix socket listener with file cleanup
//! - HTTP `CONNECT` tunnel halves

mod addr;
pub mod http;
#[cfg(unix)]
mod unix;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub use addr::{Protocol, RpcAddr};
#[cfg(unix)]
pub use unix::{generate_socket_path, UnixSocketListener};

use crate::error::Result;

/// Read half of any transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of any transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split a duplex stream into boxed halves.
pub fn split_boxed<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

/// Open the raw stream for `addr`.
///
/// For [`Protocol::Http`] this is the TCP connection the tunnel runs over;
/// the caller performs the `CONNECT` exchange.
pub async fn connect(addr: &RpcAddr) -> Result<(BoxedReader, BoxedWriter)> {
    match addr.protocol {
        Protocol::Tcp | Protocol::Http => {
            let stream = TcpStream::connect(&addr.address).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Protocol::Unix => {
            let stream = tokio::net::UnixStream::connect(&addr.address).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Protocol::Unix => Err(crate::error::RpcError::Discovery(
            "unix sockets are not supported on this platform".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = RpcAddr::new(Protocol::Tcp, listener.local_addr().unwrap().to_string());

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (_reader, mut writer) = connect(&addr).await.unwrap();
        writer.write_all(b"ping").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = RpcAddr::new(Protocol::Tcp, listener.local_addr().unwrap().to_string());
        drop(listener);

        assert!(connect(&addr).await.is_err());
    }
}
