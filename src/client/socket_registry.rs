use std::sync::Arc;

use anyhow::anyhow;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::client::socket_state::SocketState;
use crate::error::ClientError;
use crate::ipc::SocketId;


/// All live sockets of a client, by the id the middleware assigned to them. Background tasks
///  look sockets up by id on every use rather than holding on to them. The lock is never held
///  across I/O.
#[derive(Default)]
pub struct SocketRegistry {
    sockets: RwLock<FxHashMap<SocketId, Arc<SocketState>>>,
}

impl SocketRegistry {
    pub fn new() -> SocketRegistry {
        Default::default()
    }

    pub async fn register(&self, socket: Arc<SocketState>) -> Result<(), ClientError> {
        let mut sockets = self.sockets.write().await;
        if sockets.contains_key(&socket.id()) {
            return Err(ClientError::Protocol(anyhow!("middleware assigned socket id {} twice", socket.id())));
        }
        trace!("registering socket {}", socket.id());
        sockets.insert(socket.id(), socket);
        Ok(())
    }

    pub async fn deregister(&self, socket_id: SocketId) -> Option<Arc<SocketState>> {
        trace!("deregistering socket {}", socket_id);
        self.sockets.write().await
            .remove(&socket_id)
    }

    pub async fn get(&self, socket_id: SocketId) -> Option<Arc<SocketState>> {
        self.sockets.read().await
            .get(&socket_id)
            .cloned()
    }

    pub async fn all(&self) -> Vec<Arc<SocketState>> {
        self.sockets.read().await
            .values()
            .cloned()
            .collect()
    }
}
