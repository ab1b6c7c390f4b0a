//! Line-oriented I/O for the control plane.
//!
//! The dialing side writes its [`ConnectionOptions`] line right after the
//! transport connects; the accepting side reads it before any frame.
//! There is no acknowledgement: the dialer starts sending frames at once.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::options::{ConnectionOptions, MAX_OPTIONS_LINE};
use crate::error::{Result, RpcError};
use crate::protocol::FrameReader;

/// Write a raw line and flush.
///
/// The caller supplies the terminator, so HTTP heads (`\n\n`) and JSON
/// lines share this path.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Send the options block (dialing side).
pub async fn send_options<W: AsyncWrite + Unpin>(
    writer: &mut W,
    opts: &ConnectionOptions,
) -> Result<()> {
    write_line(writer, &opts.to_json_line()?).await
}

/// Receive and validate the options block (accepting side).
pub async fn receive_options<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
) -> Result<ConnectionOptions> {
    let line = reader
        .read_line(MAX_OPTIONS_LINE)
        .await?
        .ok_or_else(|| RpcError::Protocol("connection closed before options".to_string()))?;
    ConnectionOptions::from_json_line(&line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecType;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_options_roundtrip_over_stream() {
        let (mut client, server) = duplex(4096);
        let opts = ConnectionOptions::default().with_codec(CodecType::Json);

        send_options(&mut client, &opts).await.unwrap();

        let mut reader = FrameReader::new(server);
        let received = receive_options(&mut reader).await.unwrap();
        assert_eq!(received, opts);
    }

    #[tokio::test]
    async fn test_closed_before_options() {
        let (client, server) = duplex(64);
        drop(client);

        let mut reader = FrameReader::new(server);
        let err = receive_options(&mut reader).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }
}
