//! Response framing and the connection writer task.
//!
//! # Architecture
//!
//! ```text
//! LogicalStream 1 ─┐
//! LogicalStream 2 ─┼─► mpsc::UnboundedSender<Outbound> ─► writer task ─► socket
//! Dispatcher      ─┘                                     (ResponseEncoder)
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::Result;
use crate::protocol::{Response, RESPONSE_HEADER_SIZE, RESPONSE_LENGTH_OFFSET};

/// Maximum frames coalesced into one write.
const MAX_BATCH_SIZE: usize = 64;

/// Something queued for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Typed response, framed by the encoder
    Response(Response),
    /// Pre-framed bytes written unchanged (handshake reply)
    Raw(Bytes),
}

impl From<Response> for Outbound {
    fn from(response: Response) -> Self {
        Outbound::Response(response)
    }
}

/// Writes the body length into serialized responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    /// Create an encoder
    pub fn new() -> Self {
        Self
    }

    /// Frame one outbound item for the wire.
    pub fn encode(&self, outbound: Outbound) -> Bytes {
        match outbound {
            Outbound::Raw(bytes) => bytes,
            Outbound::Response(response) => {
                let mut buf = response.serialize();
                Self::patch_length(&mut buf);
                buf.freeze()
            },
        }
    }

    /// Patch `len - header` into the placeholder at offset 4.
    ///
    /// Buffers shorter than a response header are left alone.
    pub fn patch_length(buf: &mut BytesMut) {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return;
        }
        let dlen = (buf.len() - RESPONSE_HEADER_SIZE) as i32;
        buf[RESPONSE_LENGTH_OFFSET..RESPONSE_HEADER_SIZE].copy_from_slice(&dlen.to_be_bytes());
    }
}

/// Spawn the task that drains `rx` into `writer`.
///
/// The task ends cleanly once every sender is dropped.
pub fn spawn_writer_task<W>(
    writer: W,
    rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(writer_loop(writer, rx))
}

async fn writer_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoder = ResponseEncoder::new();
    let mut batch = BytesMut::new();

    while let Some(first) = rx.recv().await {
        batch.clear();
        batch.extend_from_slice(&encoder.encode(first));

        let mut frames = 1;
        while frames < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(next) => {
                    batch.extend_from_slice(&encoder.encode(next));
                    frames += 1;
                },
                Err(_) => break,
            }
        }

        trace!(frames, bytes = batch.len(), "Writing batch");
        writer.write_all(&batch).await?;
        writer.flush().await?;
    }

    debug!("Writer channel closed");
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, FileHandle, ResponseFrame};

    #[test]
    fn test_patch_length() {
        let encoded = ResponseEncoder::new().encode(Outbound::Response(Response::error(
            1,
            ErrorCode::Unsupported,
            "Request kXR_query not supported",
        )));
        let dlen = i32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(dlen as usize, encoded.len() - RESPONSE_HEADER_SIZE);
    }

    #[test]
    fn test_raw_passes_through() {
        let raw = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(ResponseEncoder::new().encode(Outbound::Raw(raw.clone())), raw);
    }

    #[test]
    fn test_ok_has_empty_body() {
        let encoded = ResponseEncoder::new().encode(Response::ok(9).into());
        assert_eq!(&encoded[..], &[0, 9, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_writer_task_preserves_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_writer_task(server, rx);

        tx.send(Outbound::Raw(Bytes::from_static(b"RAW!"))).unwrap();
        tx.send(Response::ok(1).into()).unwrap();
        tx.send(
            Response::Open {
                stream_id: 2,
                handle: FileHandle::new(3),
                stat: None,
            }
            .into(),
        )
        .unwrap();
        drop(tx);
        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        let mut client = client;
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut received)
            .await
            .unwrap();

        assert_eq!(&received[..4], b"RAW!");
        let mut rest = BytesMut::from(&received[4..]);
        let first = ResponseFrame::split_from(&mut rest).unwrap();
        let second = ResponseFrame::split_from(&mut rest).unwrap();
        assert_eq!(first.stream_id, 1);
        assert!(first.body.is_empty());
        assert_eq!(second.stream_id, 2);
        assert_eq!(&second.body[..], &[0, 0, 0, 3]);
    }
}
