use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::ClientError;
use crate::ipc::frame::Frame;


/// Handle for enqueueing encoded frames for the writer task. Frames are written in the order they
///  are enqueued. The queue itself is unbounded: the volume of data frames is bounded by the
///  send windows' budgets, and control frames are bounded by the sync channel's single slot.
#[derive(Clone, Debug)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl OutboundSender {
    pub fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        trace!("enqueueing {:?} frame: field1={} field2={} field3={}, {} payload bytes", frame.kind, frame.field1, frame.field2, frame.field3, frame.payload.len());
        self.tx.send(frame.to_bytes())
            .map_err(|_| ClientError::ConnectionLost)
    }
}

pub fn outbound_channel() -> (OutboundSender, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundSender { tx }, rx)
}

/// Drains the queue onto the stream, flushing whenever the queue runs empty. Returns when all
///  senders are gone, or with the cause of a write failure.
pub async fn run_outbound_writer<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Bytes>) -> Result<(), ClientError> {
    while let Some(buf) = rx.recv().await {
        writer.write_all(&buf).await?;
        if rx.is_empty() {
            writer.flush().await?;
        }
    }
    trace!("outbound queue closed, shutting down writer");
    writer.shutdown().await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::message_kind::FunctionId;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (client, mut server) = duplex(4096);
        let (sender, rx) = outbound_channel();
        let writer = tokio::spawn(run_outbound_writer(client, rx));

        let first = Frame::sync_request(FunctionId::CreateSocket, 1, Bytes::new());
        let second = Frame::async_send(2, 3, 4, Bytes::from_static(b"data"));
        sender.send_frame(&first).unwrap();
        sender.send_frame(&second).unwrap();
        drop(sender);

        writer.await.unwrap().unwrap();

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        let mut expected = first.to_bytes().to_vec();
        expected.extend_from_slice(&second.to_bytes());
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (sender, rx) = outbound_channel();
        drop(rx);
        let frame = Frame::sync_request(FunctionId::CreateSocket, 1, Bytes::new());
        assert!(matches!(sender.send_frame(&frame), Err(ClientError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_write_failure() {
        let (client, server) = duplex(64);
        drop(server);
        let (sender, rx) = outbound_channel();
        sender.send_frame(&Frame::sync_request(FunctionId::CreateSocket, 1, Bytes::new())).unwrap();

        let result = run_outbound_writer(client, rx).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
