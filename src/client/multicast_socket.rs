use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::futures::Notified;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::client::mcast_client::{decode_response, ClientInner};
use crate::client::send_window::{SendWindow, SendWindowStats};
use crate::client::socket_state::SocketState;
use crate::error::ClientError;
use crate::ipc::group_uri::GroupUri;
use crate::ipc::message_kind::FunctionId;
use crate::ipc::wire_codec::*;
use crate::ipc::{InterfaceId, SocketId};


async fn wait_for(notified: Pin<&mut Notified<'_>>, deadline: Option<Instant>, what: &'static str) -> Result<(), ClientError> {
    match deadline {
        None => {
            notified.await;
            Ok(())
        }
        Some(deadline) => tokio::time::timeout_at(deadline, notified).await
            .map_err(|_| ClientError::Timeout(what)),
    }
}

async fn destroy_socket(client: &ClientInner, state: &SocketState) -> Result<(), ClientError> {
    client.registry.deregister(state.id()).await;
    client.connection.check()?;
    client.sync.call(FunctionId::DeleteSocket, encode_socket_id(state.id())).await?;
    info!("destroyed socket {}", state.id());
    Ok(())
}


/// A multicast socket: joins groups, sends data to groups and receives data from the groups it
///  joined. All operations fail with [ClientError::SocketClosed] once the socket is destroyed.
///
/// Sending is flow controlled per destination group. `send` waits until the middleware has
///  acknowledged enough data to make room, `try_send` returns `false` instead.
///
/// Dropping a socket without destroying it destroys it in the background.
pub struct MulticastSocket {
    client: Arc<ClientInner>,
    state: Arc<SocketState>,
}

impl MulticastSocket {
    pub(crate) fn new(client: Arc<ClientInner>, state: Arc<SocketState>) -> MulticastSocket {
        MulticastSocket { client, state }
    }

    pub fn id(&self) -> SocketId {
        self.state.id()
    }

    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.state.is_closed() {
            return Err(ClientError::SocketClosed(self.state.id()));
        }
        self.client.connection.check()
    }

    async fn call(&self, function_id: FunctionId, payload: Bytes) -> Result<Bytes, ClientError> {
        self.ensure_usable()?;
        self.client.sync.call(function_id, payload).await
    }

    pub async fn join(&self, group: &GroupUri) -> Result<(), ClientError> {
        self.call(FunctionId::Join, encode_socket_and_uri(self.id(), group)).await?;
        self.state.memberships.write().await
            .insert(group.clone());
        info!("socket {} joined {}", self.id(), group);
        Ok(())
    }

    pub async fn leave(&self, group: &GroupUri) -> Result<(), ClientError> {
        self.call(FunctionId::Leave, encode_socket_and_uri(self.id(), group)).await?;
        self.state.memberships.write().await
            .remove(group);
        info!("socket {} left {}", self.id(), group);
        Ok(())
    }

    /// the groups this socket joined
    pub async fn memberships(&self) -> Vec<GroupUri> {
        self.state.memberships.read().await
            .iter()
            .cloned()
            .collect()
    }

    pub async fn set_ttl(&self, hops: u8) -> Result<(), ClientError> {
        self.call(FunctionId::SetTtl, encode_socket_and_ttl(self.id(), hops)).await?;
        debug!("socket {}: ttl set to {}", self.id(), hops);
        Ok(())
    }

    /// Fetches the ids of the interfaces this socket uses from the middleware
    pub async fn interface_ids(&self) -> Result<Vec<InterfaceId>, ClientError> {
        let payload = self.call(FunctionId::GetSockInterfaces, encode_socket_id(self.id())).await?;
        let ids = decode_response(payload, |b| decode_id_list(b))?;
        *self.state.interfaces.write().await = ids.iter().copied().collect();
        Ok(ids)
    }

    pub async fn add_interface(&self, interface_id: InterfaceId) -> Result<(), ClientError> {
        self.call(FunctionId::AddSockInterface, encode_socket_and_interface(self.id(), interface_id)).await?;
        self.state.interfaces.write().await
            .insert(interface_id);
        Ok(())
    }

    pub async fn remove_interface(&self, interface_id: InterfaceId) -> Result<(), ClientError> {
        self.call(FunctionId::DelSockInterface, encode_socket_and_interface(self.id(), interface_id)).await?;
        self.state.interfaces.write().await
            .remove(&interface_id);
        Ok(())
    }

    pub async fn set_interfaces(&self, interface_ids: &[InterfaceId]) -> Result<(), ClientError> {
        self.call(FunctionId::SetSockInterfaces, encode_socket_and_interfaces(self.id(), interface_ids)).await?;
        *self.state.interfaces.write().await = interface_ids.iter().copied().collect();
        Ok(())
    }

    /// Descriptors of the interfaces this socket uses
    pub async fn list_interfaces(&self) -> Result<Vec<InterfaceDescriptor>, ClientError> {
        let ids = self.interface_ids().await?;

        let payload = self.call(FunctionId::GetInterfaces, Bytes::new()).await?;
        let all = decode_response(payload, |b| decode_interface_list(b))?;

        Ok(all.into_iter()
            .filter(|interface| ids.contains(&interface.index))
            .collect())
    }

    fn checked_payload(&self, data: &[u8]) -> Result<Bytes, ClientError> {
        let max = self.client.max_payload_len();
        if data.len() > max {
            return Err(ClientError::OversizedPayload { len: data.len(), max });
        }
        Ok(Bytes::copy_from_slice(data))
    }

    /// The send window for `group`, creating the middleware's send stream on first use
    async fn send_window(&self, group: &GroupUri) -> Result<Arc<SendWindow>, ClientError> {
        if let Some(window) = self.state.send_window_for_group(group).await {
            return Ok(window);
        }

        let _creation_guard = self.state.lock_window_creation().await;
        if let Some(window) = self.state.send_window_for_group(group).await {
            return Ok(window);
        }

        let payload = self.call(FunctionId::CreateSendStream, encode_socket_and_uri(self.id(), group)).await?;
        let stream_id = decode_response(payload, |b| decode_stream_id(b))?;

        let window = Arc::new(SendWindow::new(
            self.id(),
            stream_id,
            group.clone(),
            self.client.config.send_window_capacity,
            self.client.outbound.clone(),
        ));
        self.state.send_windows().write().await
            .insert(window.clone());
        debug!("socket {}: created send stream {} to {}", self.id(), stream_id, group);
        Ok(window)
    }

    /// Sends `data` to `group`, waiting for room in the send window if necessary
    pub async fn send(&self, group: &GroupUri, data: &[u8]) -> Result<(), ClientError> {
        self.ensure_usable()?;
        let payload = self.checked_payload(data)?;
        let window = self.send_window(group).await?;
        let deadline = self.client.config.send_timeout
            .map(|timeout| Instant::now() + timeout);

        loop {
            let freed = self.state.window_freed();
            tokio::pin!(freed);
            freed.as_mut().enable();

            self.ensure_usable()?;
            if window.add(payload.clone()).await? {
                return Ok(());
            }

            trace!("socket {}: send window to {} is full, waiting for acks", self.id(), group);
            wait_for(freed, deadline, "send window space").await?;
        }
    }

    /// Sends `data` to `group` if the send window has room, returning `false` otherwise
    pub async fn try_send(&self, group: &GroupUri, data: &[u8]) -> Result<bool, ClientError> {
        self.ensure_usable()?;
        let payload = self.checked_payload(data)?;
        let window = self.send_window(group).await?;
        window.add(payload).await
    }

    /// Waits until all data sent so far was acknowledged
    pub async fn flush(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let freed = self.state.window_freed();
            tokio::pin!(freed);
            freed.as_mut().enable();

            self.ensure_usable()?;
            let mut drained = true;
            for window in self.state.all_send_windows().await {
                if !window.is_drained().await {
                    drained = false;
                    break;
                }
            }
            if drained {
                return Ok(());
            }

            wait_for(freed, deadline, "acks").await?;
        }
    }

    pub async fn send_window_stats(&self, group: &GroupUri) -> Option<SendWindowStats> {
        match self.state.send_window_for_group(group).await {
            Some(window) => Some(window.stats().await),
            None => None,
        }
    }

    async fn receive_until(&self, deadline: Option<Instant>) -> Result<DeliveredUnit, ClientError> {
        loop {
            let available = self.state.inbound().notified();
            tokio::pin!(available);
            available.as_mut().enable();

            if let Some(unit) = self.try_receive().await? {
                return Ok(unit);
            }
            wait_for(available, deadline, "data").await?;
        }
    }

    /// Waits for the next unit of data on any of the joined groups
    pub async fn receive(&self) -> Result<DeliveredUnit, ClientError> {
        self.receive_until(None).await
    }

    pub async fn receive_timeout(&self, timeout: Duration) -> Result<DeliveredUnit, ClientError> {
        self.receive_until(Some(Instant::now() + timeout)).await
    }

    pub async fn try_receive(&self) -> Result<Option<DeliveredUnit>, ClientError> {
        self.ensure_usable()?;
        Ok(self.state.inbound().try_take().await)
    }

    /// Releases the socket in the middleware. Blocked senders and receivers fail with
    ///  [ClientError::SocketClosed].
    pub async fn destroy(&self) -> Result<(), ClientError> {
        if !self.state.close() {
            return Err(ClientError::SocketClosed(self.id()));
        }
        destroy_socket(&self.client, &self.state).await
    }
}

impl Drop for MulticastSocket {
    fn drop(&mut self) {
        if !self.state.close() {
            return;
        }

        let socket_id = self.id();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let state = self.state.clone();
                handle.spawn(async move {
                    if let Err(e) = destroy_socket(&client, &state).await {
                        debug!("destroying dropped socket {} failed: {}", socket_id, e);
                    }
                });
            }
            Err(_) => debug!("socket {} dropped outside a runtime, not released in the middleware", socket_id),
        }
    }
}
