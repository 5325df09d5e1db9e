use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, trace, warn};

use crate::error::ClientError;
use crate::ipc::frame::{Frame, FrameHeader};
use crate::ipc::message_kind::MessageKind;
use crate::ipc::{SocketId, StreamId};


/// Parameters of a cumulative ack or retransmit request from the middleware
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StreamSignal {
    pub socket_id: SocketId,
    pub stream_id: StreamId,
    /// the cumulative ack value or the sequence number to retransmit
    pub value: u32,
}

impl StreamSignal {
    fn from_frame(frame: &Frame) -> StreamSignal {
        StreamSignal {
            socket_id: frame.field2,
            stream_id: frame.field1,
            value: frame.field3,
        }
    }
}

/// Receives the frames the reader loop reassembles, routed by message kind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FrameDispatcher: Send + Sync + 'static {
    async fn on_sync_response(&self, frame: Frame);
    async fn on_async_recv(&self, frame: Frame);
    async fn on_cumulative_ack(&self, signal: StreamSignal);
    async fn on_retransmit(&self, signal: StreamSignal);
}


enum ReadState {
    AwaitingHeader,
    AwaitingPayload(FrameHeader),
}

/// Reassembles frames from a byte stream regardless of how the bytes are split across reads.
///  Unread bytes stay at the front of one buffer, and the buffer's spare capacity is reclaimed
///  when it is topped off for the next read.
pub struct FrameReader<R> {
    reader: R,
    buf: BytesMut,
    state: ReadState,
    read_chunk_len: usize,
    max_payload_len: u32,
}

impl <R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, read_chunk_len: usize, max_payload_len: u32) -> FrameReader<R> {
        FrameReader {
            reader,
            buf: BytesMut::with_capacity(read_chunk_len),
            state: ReadState::AwaitingHeader,
            read_chunk_len: read_chunk_len.max(FrameHeader::SERIALIZED_LEN),
            max_payload_len,
        }
    }

    /// Returns the next complete frame, with the header's kind still raw. Any error is fatal
    ///  for the stream: either the transport failed, or the stream is no longer in sync.
    pub async fn next_frame(&mut self) -> Result<(FrameHeader, Bytes), ClientError> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    if self.buf.len() < FrameHeader::SERIALIZED_LEN {
                        self.fill(FrameHeader::SERIALIZED_LEN).await?;
                        continue;
                    }

                    let mut raw_header = self.buf.split_to(FrameHeader::SERIALIZED_LEN);
                    let header = FrameHeader::deser(&mut raw_header)
                        .map_err(ClientError::Protocol)?;
                    if header.payload_len > self.max_payload_len {
                        error!("frame header announces a payload of {} bytes, the maximum is {} - stream is out of sync", header.payload_len, self.max_payload_len);
                        return Err(ClientError::Protocol(anyhow::anyhow!("payload length {} exceeds maximum of {}", header.payload_len, self.max_payload_len)));
                    }
                    trace!("received frame header {:?}", header);
                    self.state = ReadState::AwaitingPayload(header);
                }
                ReadState::AwaitingPayload(header) => {
                    let payload_len = header.payload_len as usize;
                    if self.buf.len() < payload_len {
                        self.fill(payload_len).await?;
                        continue;
                    }

                    let payload = self.buf.split_to(payload_len).freeze();
                    self.state = ReadState::AwaitingHeader;
                    return Ok((header, payload));
                }
            }
        }
    }

    /// reads at least one byte, making room for `needed` bytes in total
    async fn fill(&mut self, needed: usize) -> Result<(), ClientError> {
        let missing = needed.saturating_sub(self.buf.len());
        self.buf.reserve(missing.max(self.read_chunk_len));

        let num_read = self.reader.read_buf(&mut self.buf).await?;
        if num_read == 0 {
            return Err(ClientError::Connection(std::io::ErrorKind::UnexpectedEof.into()));
        }
        trace!("read {} bytes, {} buffered", num_read, self.buf.len());
        Ok(())
    }
}

/// Routes one reassembled frame. Frames of kinds a client never receives are logged and skipped.
pub async fn dispatch_frame(header: FrameHeader, payload: Bytes, dispatcher: &dyn FrameDispatcher) {
    let frame = match Frame::from_parts(&header, payload) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("discarding frame of unknown kind {}: {}", header.message_kind, e);
            return;
        }
    };

    match frame.kind {
        MessageKind::SyncResponse => dispatcher.on_sync_response(frame).await,
        MessageKind::AsyncRecv => dispatcher.on_async_recv(frame).await,
        MessageKind::CumulativeAck => dispatcher.on_cumulative_ack(StreamSignal::from_frame(&frame)).await,
        MessageKind::Retransmit => dispatcher.on_retransmit(StreamSignal::from_frame(&frame)).await,
        MessageKind::SyncRequest | MessageKind::AsyncEvent | MessageKind::AsyncSend => {
            warn!("discarding unexpected {:?} frame from middleware", frame.kind);
        }
    }
}

/// The reader loop. It only returns when the stream failed, with the cause; it never restarts.
pub async fn run_frame_reader<R: AsyncRead + Unpin>(mut reader: FrameReader<R>, dispatcher: Arc<dyn FrameDispatcher>) -> ClientError {
    loop {
        match reader.next_frame().await {
            Ok((header, payload)) => dispatch_frame(header, payload, dispatcher.as_ref()).await,
            Err(e) => return e,
        }
    }
}
