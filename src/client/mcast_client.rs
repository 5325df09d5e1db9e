use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::client::inbound::InboundDispatcher;
use crate::client::multicast_socket::MulticastSocket;
use crate::client::socket_registry::SocketRegistry;
use crate::client::socket_state::SocketState;
use crate::client::stream_workers::{spawn_stream_workers, StreamSignals};
use crate::client::sync_channel::SyncChannel;
use crate::config::ClientConfig;
use crate::connection::connection_state::{ConnectionLostHandler, ConnectionState};
use crate::connection::frame_reader::{run_frame_reader, FrameDispatcher, FrameReader, StreamSignal};
use crate::connection::handshake::perform_handshake;
use crate::connection::outbound_writer::{outbound_channel, run_outbound_writer, OutboundSender};
use crate::error::ClientError;
use crate::ipc::frame::Frame;
use crate::ipc::group_uri::GroupUri;
use crate::ipc::message_kind::FunctionId;
use crate::ipc::wire_codec::*;
use crate::ipc::InterfaceId;


/// Decodes a response payload, treating anything malformed as a protocol error
pub(crate) fn decode_response<T>(mut payload: Bytes, decode: impl FnOnce(&mut Bytes) -> anyhow::Result<T>) -> Result<T, ClientError> {
    decode(&mut payload)
        .map_err(ClientError::Protocol)
}

/// Routes frames from the reader into the client's components
struct EngineDispatcher {
    sync: Arc<SyncChannel>,
    inbound: InboundDispatcher,
    signals: StreamSignals,
}

#[async_trait]
impl FrameDispatcher for EngineDispatcher {
    async fn on_sync_response(&self, frame: Frame) {
        self.sync.on_response(frame);
    }

    async fn on_async_recv(&self, frame: Frame) {
        self.inbound.on_async_recv(frame).await;
    }

    async fn on_cumulative_ack(&self, signal: StreamSignal) {
        self.signals.ack(signal).await;
    }

    async fn on_retransmit(&self, signal: StreamSignal) {
        self.signals.retransmit(signal).await;
    }
}

/// Everything that must happen when either direction of the stream fails
struct ConnectionLossHandling {
    connection: Arc<ConnectionState>,
    sync: Arc<SyncChannel>,
    registry: Arc<SocketRegistry>,
}

impl ConnectionLossHandling {
    async fn on_connection_lost(&self, cause: ClientError) {
        if !self.connection.mark_lost(&cause) {
            return;
        }
        self.sync.fail_pending();
        for socket in self.registry.all().await {
            socket.wake_all();
        }
    }
}


pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    max_message_size: u32,
    pub(crate) sync: Arc<SyncChannel>,
    pub(crate) registry: Arc<SocketRegistry>,
    pub(crate) outbound: OutboundSender,
    pub(crate) connection: Arc<ConnectionState>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientInner {
    /// the largest payload a single send accepts
    pub(crate) fn max_payload_len(&self) -> usize {
        match self.max_message_size as usize {
            0 => self.config.max_payload_len,
            advertised => advertised.min(self.config.max_payload_len),
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        trace!("shutting down client tasks");
        for task in &self.tasks {
            task.abort();
        }
    }
}


/// A connection to the multicast middleware. Sockets created from a client share its connection;
///  the connection's background tasks end when the client and all its sockets are dropped.
#[derive(Clone)]
pub struct McastClient {
    inner: Arc<ClientInner>,
}

impl McastClient {
    pub async fn connect(config: ClientConfig) -> Result<McastClient, ClientError> {
        Self::connect_with_handler(config, None).await
    }

    /// `on_lost` is called once, from a background task, when the connection fails
    pub async fn connect_with_handler(config: ClientConfig, on_lost: Option<ConnectionLostHandler>) -> Result<McastClient, ClientError> {
        config.validate()
            .map_err(ClientError::InvalidArgument)?;

        debug!("connecting to middleware at {}", config.middleware_addr);
        let stream = TcpStream::connect(config.middleware_addr).await?;
        stream.set_nodelay(config.tcp_nodelay)?;

        Self::from_stream(stream, config, on_lost).await
    }

    /// Runs the handshake and the client on an already established stream
    pub async fn from_stream<S>(mut stream: S, config: ClientConfig, on_lost: Option<ConnectionLostHandler>) -> Result<McastClient, ClientError>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
    {
        config.validate()
            .map_err(ClientError::InvalidArgument)?;

        let max_message_size = perform_handshake(&mut stream).await?;
        info!("connected to middleware, max message size {}", max_message_size);

        let (read_half, write_half) = tokio::io::split(stream);

        let connection = Arc::new(ConnectionState::new(on_lost));
        let (outbound, outbound_rx) = outbound_channel();
        let sync = Arc::new(SyncChannel::new(outbound.clone(), connection.clone(), config.sync_timeout));
        let registry = Arc::new(SocketRegistry::new());

        let (signals, mut tasks) = spawn_stream_workers(registry.clone(), config.signal_queue_len);

        let loss_handling = Arc::new(ConnectionLossHandling {
            connection: connection.clone(),
            sync: sync.clone(),
            registry: registry.clone(),
        });

        let dispatcher = Arc::new(EngineDispatcher {
            sync: sync.clone(),
            inbound: InboundDispatcher::new(registry.clone()),
            signals,
        });
        let reader = FrameReader::new(read_half, config.read_chunk_len, config.max_frame_payload_len);
        let reader_loss_handling = loss_handling.clone();
        tasks.push(tokio::spawn(async move {
            let cause = run_frame_reader(reader, dispatcher).await;
            reader_loss_handling.on_connection_lost(cause).await;
        }));

        tasks.push(tokio::spawn(async move {
            match run_outbound_writer(write_half, outbound_rx).await {
                Ok(()) => trace!("outbound writer finished"),
                Err(e) => loss_handling.on_connection_lost(e).await,
            }
        }));

        Ok(McastClient {
            inner: Arc::new(ClientInner {
                config,
                max_message_size,
                sync,
                registry,
                outbound,
                connection,
                tasks,
            }),
        })
    }

    /// the maximum message size the middleware announced during the handshake
    pub fn max_message_size(&self) -> u32 {
        self.inner.max_message_size
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.connection.is_lost()
    }

    pub async fn create_socket(&self) -> Result<MulticastSocket, ClientError> {
        let payload = self.inner.sync.call(FunctionId::CreateSocket, Bytes::new()).await?;
        let socket_id = decode_response(payload, |b| decode_u32(b))?;

        let state = Arc::new(SocketState::new(socket_id, self.inner.config.receive_budget));
        self.inner.registry.register(state.clone()).await?;
        info!("created socket {}", socket_id);

        Ok(MulticastSocket::new(self.inner.clone(), state))
    }

    /// Creates a socket that uses only the given interfaces. The socket is destroyed again if the
    ///  middleware rejects the interfaces.
    pub async fn create_socket_on(&self, interface_ids: &[InterfaceId]) -> Result<MulticastSocket, ClientError> {
        let socket = self.create_socket().await?;
        if let Err(e) = socket.set_interfaces(interface_ids).await {
            if let Err(destroy_err) = socket.destroy().await {
                debug!("could not destroy socket {} after failing to set its interfaces: {}", socket.id(), destroy_err);
            }
            return Err(e);
        }
        Ok(socket)
    }

    /// all network interfaces the middleware knows about
    pub async fn get_interfaces(&self) -> Result<Vec<InterfaceDescriptor>, ClientError> {
        let payload = self.inner.sync.call(FunctionId::GetInterfaces, Bytes::new()).await?;
        decode_response(payload, |b| decode_interface_list(b))
    }

    pub async fn group_set(&self, interface_id: InterfaceId) -> Result<Vec<GroupDescriptor>, ClientError> {
        let payload = self.inner.sync.call(FunctionId::GroupSet, encode_interface_id(interface_id)).await?;
        decode_response(payload, |b| decode_group_list(b))
    }

    pub async fn neighbor_set(&self, interface_id: InterfaceId) -> Result<Vec<GroupUri>, ClientError> {
        let payload = self.inner.sync.call(FunctionId::NeighborSet, encode_interface_id(interface_id)).await?;
        decode_response(payload, |b| decode_uri_list(b))
    }

    pub async fn children_set(&self, interface_id: InterfaceId, group: &GroupUri) -> Result<Vec<GroupUri>, ClientError> {
        let payload = self.inner.sync.call(FunctionId::ChildrenSet, encode_interface_and_uri(interface_id, group)).await?;
        decode_response(payload, |b| decode_uri_list(b))
    }

    pub async fn parent_set(&self, interface_id: InterfaceId, group: &GroupUri) -> Result<Vec<GroupUri>, ClientError> {
        let payload = self.inner.sync.call(FunctionId::ParentSet, encode_interface_and_uri(interface_id, group)).await?;
        decode_response(payload, |b| decode_uri_list(b))
    }

    /// whether this host is the designated host for `group` on the given interface
    pub async fn designated_host(&self, interface_id: InterfaceId, group: &GroupUri) -> Result<bool, ClientError> {
        let payload = self.inner.sync.call(FunctionId::DesignatedHost, encode_interface_and_uri(interface_id, group)).await?;
        decode_response(payload, |b| decode_bool(b))
    }
}
