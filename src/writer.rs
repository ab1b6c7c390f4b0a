//! Dedicated writer task for outgoing frames.
//!
//! Server call tasks finish in any order, and client callers may give up on
//! a call at any await point. Instead of sharing the write half behind a
//! mutex, each connection gets a writer task fed by an mpsc channel, so a
//! frame's prefix, header and body always go out together no matter what
//! happens to the task that queued it. Ready frames are batched into one
//! vectored write.
//!
//! # Architecture
//!
//! ```text
//! Call task 1 ─┐
//! Call task 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! Call task N ─┘
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::CodecType;
use crate::error::{Result, RpcError};
use crate::protocol::{FramePrefix, Header, DEFAULT_MAX_BODY_SIZE, PREFIX_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded length prefix.
    pub prefix: [u8; PREFIX_SIZE],
    /// Encoded header.
    pub header: Bytes,
    /// Encoded body.
    pub body: Bytes,
}

impl OutboundFrame {
    /// Create an outbound frame from encoded parts.
    ///
    /// Parts the peer would reject as oversized fail here with a framing
    /// error, before anything reaches the socket.
    pub fn new(header: Bytes, body: Bytes) -> Result<Self> {
        let prefix = FramePrefix::for_parts(header.len(), body.len(), DEFAULT_MAX_BODY_SIZE)?;
        Ok(Self {
            prefix: prefix.encode(),
            header,
            body,
        })
    }

    /// Encode header and body with `codec`.
    pub fn encode<T: Serialize + ?Sized>(codec: CodecType, header: &Header, body: &T) -> Result<Self> {
        Self::new(
            Bytes::from(codec.encode(header)?),
            Bytes::from(codec.encode(body)?),
        )
    }

    /// Total size of this frame (prefix + header + body).
    #[inline]
    pub fn size(&self) -> usize {
        PREFIX_SIZE + self.header.len() + self.body.len()
    }

    fn parts(&self) -> [&[u8]; 3] {
        [&self.prefix, &self.header, &self.body]
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; the task exits once every handle is dropped.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| RpcError::Shutdown)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The JoinHandle resolves once all handles are dropped and every queued
/// frame is flushed, or on the first write error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them in batches.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
        batch.clear();
    }

    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data not yet written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for part in batch.iter().flat_map(|f| f.parts()) {
        let end = offset + part.len();
        if !part.is_empty() && skip_bytes < end {
            slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameBuffer;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(seq: u64) -> OutboundFrame {
        OutboundFrame::encode(CodecType::MsgPack, &Header::new("Foo.Sum", seq), &seq).unwrap()
    }

    #[test]
    fn test_outbound_frame_size() {
        let f = OutboundFrame::new(Bytes::from_static(b"head"), Bytes::from_static(b"body")).unwrap();
        assert_eq!(f.size(), PREFIX_SIZE + 8);
        assert_eq!(FramePrefix::decode(&f.prefix).unwrap(), FramePrefix::new(4, 4));
    }

    #[test]
    fn test_outbound_frame_rejects_oversized_body() {
        let body = Bytes::from(vec![0u8; DEFAULT_MAX_BODY_SIZE as usize + 1]);
        let err = OutboundFrame::new(Bytes::from_static(b"head"), body).unwrap_err();
        assert!(matches!(err, RpcError::Framing(_)));
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![OutboundFrame::new(
            Bytes::from_static(b"head"),
            Bytes::from_static(b"hello"),
        )
        .unwrap()];
        assert_eq!(build_remaining_slices(&batch, 0).len(), 3);
    }

    #[test]
    fn test_build_remaining_slices_partial_prefix() {
        let batch = vec![OutboundFrame::new(
            Bytes::from_static(b"head"),
            Bytes::from_static(b"hello"),
        )
        .unwrap()];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].len(), PREFIX_SIZE - 5);
    }

    #[test]
    fn test_build_remaining_slices_skips_empty_body() {
        let batch = vec![OutboundFrame::new(Bytes::from_static(b"head"), Bytes::new()).unwrap()];
        let slices = build_remaining_slices(&batch, PREFIX_SIZE + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 3);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(frame).collect();
        let expected: usize = batch.iter().map(|f| f.size()).sum();

        write_batch(&mut buf, &batch).await.unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), expected);

        let frames = FrameBuffer::new().push(&written).unwrap();
        assert_eq!(frames.len(), 5);
    }

    #[tokio::test]
    async fn test_writer_task_keeps_frames_whole() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        let mut senders = Vec::new();
        for seq in 0..20u64 {
            let handle = handle.clone();
            senders.push(tokio::spawn(async move { handle.send(frame(seq)).await }));
        }
        for s in senders {
            s.await.unwrap().unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut bytes = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), server.read_to_end(&mut bytes))
            .await
            .unwrap()
            .unwrap();

        let frames = FrameBuffer::new().push(&bytes).unwrap();
        assert_eq!(frames.len(), 20);
        for f in frames {
            let header = f.decode_header(CodecType::MsgPack).unwrap();
            let body: u64 = f.decode_body(CodecType::MsgPack).unwrap();
            assert_eq!(header.seq, body);
        }
    }
}
