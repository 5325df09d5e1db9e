use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard, Notify, RwLock};

use crate::client::inbound::InboundQueue;
use crate::client::send_window::SendWindow;
use crate::ipc::group_uri::GroupUri;
use crate::ipc::{InterfaceId, SocketId, StreamId};


#[derive(Default)]
pub struct SendWindows {
    pub by_group: FxHashMap<GroupUri, Arc<SendWindow>>,
    pub by_stream: FxHashMap<StreamId, Arc<SendWindow>>,
}

impl SendWindows {
    pub fn insert(&mut self, window: Arc<SendWindow>) {
        self.by_stream.insert(window.stream_id(), window.clone());
        self.by_group.insert(window.destination().clone(), window);
    }
}

/// The part of a socket that background tasks route to by socket id: its send windows, its
///  inbound queue and the wakeups for tasks blocked on either.
pub struct SocketState {
    id: SocketId,
    closed: AtomicBool,
    inbound: InboundQueue,
    send_windows: RwLock<SendWindows>,
    /// held while a send stream is created, so concurrent first sends to a group create one
    window_creation: Mutex<()>,
    /// Signalled whenever an ack frees budget in any of this socket's send windows. Waiters
    ///  re-check their own window.
    window_freed: Notify,
    pub(crate) interfaces: RwLock<BTreeSet<InterfaceId>>,
    pub(crate) memberships: RwLock<BTreeSet<GroupUri>>,
}

impl SocketState {
    pub fn new(id: SocketId, receive_budget: usize) -> SocketState {
        SocketState {
            id,
            closed: AtomicBool::new(false),
            inbound: InboundQueue::new(receive_budget),
            send_windows: Default::default(),
            window_creation: Default::default(),
            window_freed: Notify::new(),
            interfaces: Default::default(),
            memberships: Default::default(),
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns `true` for the first caller only
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.wake_all();
        first
    }

    pub fn inbound(&self) -> &InboundQueue {
        &self.inbound
    }

    pub fn send_windows(&self) -> &RwLock<SendWindows> {
        &self.send_windows
    }

    pub async fn lock_window_creation(&self) -> MutexGuard<'_, ()> {
        self.window_creation.lock().await
    }

    pub async fn send_window_for_group(&self, group: &GroupUri) -> Option<Arc<SendWindow>> {
        self.send_windows.read().await
            .by_group.get(group)
            .cloned()
    }

    pub async fn send_window_for_stream(&self, stream_id: StreamId) -> Option<Arc<SendWindow>> {
        self.send_windows.read().await
            .by_stream.get(&stream_id)
            .cloned()
    }

    pub async fn all_send_windows(&self) -> Vec<Arc<SendWindow>> {
        self.send_windows.read().await
            .by_stream.values()
            .cloned()
            .collect()
    }

    pub fn window_freed(&self) -> tokio::sync::futures::Notified<'_> {
        self.window_freed.notified()
    }

    pub fn wake_senders(&self) {
        self.window_freed.notify_waiters();
    }

    /// wakes every task blocked on this socket so it can re-check the socket's state
    pub fn wake_all(&self) {
        self.window_freed.notify_waiters();
        self.inbound.wake_all();
    }
}
