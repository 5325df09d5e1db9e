use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use crate::client::mcast_client::McastClient;
use crate::config::ClientConfig;
use crate::connection::connection_state::ConnectionLostHandler;
use crate::connection::frame_reader::FrameReader;
use crate::connection::handshake::{MAGIC_NUMBER, MAJOR_VERSION, MINOR_VERSION};
use crate::ipc::frame::Frame;
use crate::ipc::group_uri::GroupUri;
use crate::ipc::message_kind::{ErrorCode, FunctionId, MessageKind};
use crate::ipc::wire_codec::{encode_delivered_unit, encode_error_message};
use crate::ipc::{SequenceNumber, SocketId, StreamId};


/// Client config suitable for talking to a [FakeMiddleware]: the address is never used, and
///  timeouts are short enough for tests to fail rather than hang
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
    config.sync_timeout = Some(Duration::from_secs(5));
    config.send_timeout = Some(Duration::from_secs(5));
    config
}

/// The middleware side of an in-memory connection. Tests script the conversation: they read the
///  frames the client sends, and write responses and asynchronous frames back.
///
/// The helpers panic on unexpected input, which is what a test wants.
pub struct FakeMiddleware {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeMiddleware {
    pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 65_000;

    /// Performs the middleware's part of the handshake on `stream`
    pub async fn accept(mut stream: DuplexStream, max_message_size: u32) -> FakeMiddleware {
        stream.write_u8(1).await.unwrap();
        stream.write_u32_le(max_message_size).await.unwrap();

        assert_eq!(stream.read_u32_le().await.unwrap(), MAGIC_NUMBER);
        assert_eq!(stream.read_u32_le().await.unwrap(), MAJOR_VERSION);
        assert_eq!(stream.read_u32_le().await.unwrap(), MINOR_VERSION);

        let (read_half, write_half) = split(stream);
        FakeMiddleware {
            reader: FrameReader::new(read_half, 4096, u32::MAX),
            writer: write_half,
        }
    }

    pub async fn connect_client(config: ClientConfig) -> (McastClient, FakeMiddleware) {
        Self::connect_client_with_handler(config, None).await
    }

    pub async fn connect_client_with_handler(config: ClientConfig, on_lost: Option<ConnectionLostHandler>) -> (McastClient, FakeMiddleware) {
        let (client_end, middleware_end) = duplex(1024 * 1024);
        let (client, middleware) = tokio::join!(
            McastClient::from_stream(client_end, config, on_lost),
            FakeMiddleware::accept(middleware_end, Self::DEFAULT_MAX_MESSAGE_SIZE),
        );
        (client.unwrap(), middleware)
    }

    pub async fn next_frame(&mut self) -> Frame {
        let (header, payload) = self.reader.next_frame().await.unwrap();
        Frame::from_parts(&header, payload).unwrap()
    }

    /// Fails if the client sends anything within `within`
    pub async fn expect_no_frame(&mut self, within: Duration) {
        if let Ok(result) = tokio::time::timeout(within, self.reader.next_frame()).await {
            panic!("expected no frame, got {:?}", result);
        }
    }

    pub async fn expect_request(&mut self, function_id: FunctionId) -> Frame {
        let frame = self.next_frame().await;
        assert_eq!(frame.kind, MessageKind::SyncRequest, "expected sync request, got {:?}", frame);
        assert_eq!(FunctionId::try_from(frame.field1).ok(), Some(function_id), "unexpected request {:?}", frame);
        frame
    }

    pub async fn respond(&mut self, request: &Frame, payload: Bytes) {
        let response = Frame::new(MessageKind::SyncResponse, ErrorCode::None.into(), request.field2, 0, payload);
        self.send_frame(&response).await;
    }

    pub async fn respond_error(&mut self, request: &Frame, code: ErrorCode, message: &str) {
        let response = Frame::new(MessageKind::SyncResponse, code.into(), request.field2, 0, encode_error_message(message));
        self.send_frame(&response).await;
    }

    /// Expects a request for `function_id` and answers it successfully with `payload`. Returns
    ///  the request for inspection.
    pub async fn serve(&mut self, function_id: FunctionId, payload: Bytes) -> Frame {
        let request = self.expect_request(function_id).await;
        self.respond(&request, payload).await;
        request
    }

    pub async fn deliver(&mut self, socket_id: SocketId, group: &GroupUri, content: &[u8]) {
        let frame = Frame::new(MessageKind::AsyncRecv, 0, socket_id, 0, encode_delivered_unit(group, content));
        self.send_frame(&frame).await;
    }

    pub async fn ack(&mut self, socket_id: SocketId, stream_id: StreamId, cumulative_ack: SequenceNumber) {
        let frame = Frame::new(MessageKind::CumulativeAck, stream_id, socket_id, cumulative_ack, Bytes::new());
        self.send_frame(&frame).await;
    }

    pub async fn request_retransmit(&mut self, socket_id: SocketId, stream_id: StreamId, seq: SequenceNumber) {
        let frame = Frame::new(MessageKind::Retransmit, stream_id, socket_id, seq, Bytes::new());
        self.send_frame(&frame).await;
    }

    pub async fn send_frame(&mut self, frame: &Frame) {
        self.writer.write_all(&frame.to_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}
