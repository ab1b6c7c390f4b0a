//! HTTP `CONNECT` adapter.
//!
//! Lets an RPC connection start as an HTTP/1.0 request so it can share a
//! port with HTTP tooling. After the `200` reply, the stream carries the
//! normal options line and frames.
//!
//! ```text
//! client: CONNECT /_tinyrpc_ HTTP/1.0\n\n
//! server: HTTP/1.0 200 Connected to Tiny RPC\n\n
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use crate::control::write_line;
use crate::error::{Result, RpcError};
use crate::protocol::FrameReader;

/// Path the tunnel is served on.
pub const DEFAULT_RPC_PATH: &str = "/_tinyrpc_";

/// Status of a successful tunnel reply.
pub const CONNECTED: &str = "200 Connected to Tiny RPC";

/// Maximum length of a request, status or header line.
const MAX_HTTP_LINE: usize = 8192;

/// Maximum number of header lines accepted.
const MAX_HTTP_HEADERS: usize = 100;

/// Open the tunnel (dialing side).
pub async fn connect_tunnel<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_line(writer, &format!("CONNECT {} HTTP/1.0\n\n", DEFAULT_RPC_PATH)).await?;

    let status_line = read_head_line(reader).await?;
    skip_headers(reader).await?;

    let status = status_line
        .split_once(' ')
        .map(|(_, status)| status.trim())
        .unwrap_or_default();
    if status != CONNECTED {
        return Err(RpcError::Protocol(format!(
            "unexpected HTTP response: {}",
            status_line
        )));
    }
    Ok(())
}

/// Answer a tunnel request (accepting side).
///
/// On success the stream is ready for the options handshake. On failure the
/// error reply has already been written and the caller should close.
pub async fn accept_tunnel<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request_line = read_head_line(reader).await?;
    skip_headers(reader).await?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    if method != "CONNECT" {
        write_line(
            writer,
            "HTTP/1.0 405 Method Not Allowed\nContent-Type: text/plain; charset=utf-8\n\n405 must CONNECT\n",
        )
        .await?;
        return Err(RpcError::Protocol(format!("unexpected HTTP method {}", method)));
    }

    if path != DEFAULT_RPC_PATH {
        write_line(
            writer,
            "HTTP/1.0 404 Not Found\nContent-Type: text/plain; charset=utf-8\n\n404 page not found\n",
        )
        .await?;
        return Err(RpcError::Protocol(format!("unexpected HTTP path {}", path)));
    }

    write_line(writer, &format!("HTTP/1.0 {}\n\n", CONNECTED)).await
}

async fn read_head_line<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> Result<String> {
    let line = reader
        .read_line(MAX_HTTP_LINE)
        .await?
        .ok_or_else(|| RpcError::Protocol("connection closed during HTTP exchange".to_string()))?;
    Ok(String::from_utf8_lossy(&line).into_owned())
}

async fn skip_headers<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> Result<()> {
    for _ in 0..MAX_HTTP_HEADERS {
        if read_head_line(reader).await?.is_empty() {
            return Ok(());
        }
    }
    Err(RpcError::Protocol("too many HTTP headers".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tunnel_roundtrip() {
        let (client, server) = duplex(4096);
        let (client_r, mut client_w) = tokio::io::split(client);
        let (server_r, mut server_w) = tokio::io::split(server);

        let server = tokio::spawn(async move {
            let mut reader = FrameReader::new(server_r);
            accept_tunnel(&mut reader, &mut server_w).await
        });

        let mut reader = FrameReader::new(client_r);
        connect_tunnel(&mut reader, &mut client_w).await.unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_method_gets_405() {
        let (mut client, server) = duplex(4096);
        let (server_r, mut server_w) = tokio::io::split(server);

        client
            .write_all(b"GET /_tinyrpc_ HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let mut reader = FrameReader::new(server_r);
        let err = accept_tunnel(&mut reader, &mut server_w).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
        drop(server_w);
        drop(reader);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.0 405 Method Not Allowed"));
    }

    #[tokio::test]
    async fn test_wrong_path_gets_404() {
        let (mut client, server) = duplex(4096);
        let (server_r, mut server_w) = tokio::io::split(server);

        client.write_all(b"CONNECT /other HTTP/1.0\n\n").await.unwrap();

        let mut reader = FrameReader::new(server_r);
        assert!(accept_tunnel(&mut reader, &mut server_w).await.is_err());
        drop(server_w);
        drop(reader);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.0 404 Not Found"));
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let (client, mut server) = duplex(4096);
        let (client_r, mut client_w) = tokio::io::split(client);

        server
            .write_all(b"HTTP/1.0 502 Bad Gateway\n\n")
            .await
            .unwrap();

        let mut reader = FrameReader::new(client_r);
        let err = connect_tunnel(&mut reader, &mut client_w).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "rpc protocol: unexpected HTTP response: HTTP/1.0 502 Bad Gateway"
        );
    }
}
