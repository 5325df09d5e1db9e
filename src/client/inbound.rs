use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{error, trace, warn};

use crate::client::socket_registry::SocketRegistry;
use crate::ipc::frame::Frame;
use crate::ipc::wire_codec::{decode_delivered_unit, DeliveredUnit};


struct InboundQueueInner {
    units: VecDeque<DeliveredUnit>,
    budget: i64,
}

/// A socket's queue of received data. The queue length is unbounded; admission is controlled by
///  a byte budget, and data that does not fit is dropped.
pub struct InboundQueue {
    inner: Mutex<InboundQueueInner>,
    available: Notify,
}

impl InboundQueue {
    pub fn new(budget: usize) -> InboundQueue {
        InboundQueue {
            inner: Mutex::new(InboundQueueInner {
                units: Default::default(),
                budget: budget as i64,
            }),
            available: Notify::new(),
        }
    }

    /// Enqueues the unit if the budget covers its wire size, charging the budget. Returns `false`
    ///  if the unit was not admitted.
    pub async fn offer(&self, unit: DeliveredUnit) -> bool {
        let wire_len = unit.wire_len() as i64;
        {
            let mut inner = self.inner.lock().await;
            if inner.budget < wire_len {
                return false;
            }
            inner.budget -= wire_len;
            inner.units.push_back(unit);
        }
        self.available.notify_waiters();
        true
    }

    /// Dequeues the oldest unit, crediting back exactly what `offer` charged for it
    pub async fn try_take(&self) -> Option<DeliveredUnit> {
        let mut inner = self.inner.lock().await;
        let unit = inner.units.pop_front()?;
        inner.budget += unit.wire_len() as i64;
        Some(unit)
    }

    pub async fn budget(&self) -> i64 {
        self.inner.lock().await.budget
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.units.len()
    }

    /// Registration for 'data available' notifications. Enable it before checking the queue to
    ///  avoid missing a wakeup.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.available.notified()
    }

    /// wakes all waiting receivers, e.g. so they can observe that their socket was closed
    pub fn wake_all(&self) {
        self.available.notify_waiters();
    }
}


/// Routes inbound data frames to the queue of the socket they are addressed to
pub struct InboundDispatcher {
    registry: Arc<SocketRegistry>,
}

impl InboundDispatcher {
    pub fn new(registry: Arc<SocketRegistry>) -> InboundDispatcher {
        InboundDispatcher { registry }
    }

    pub async fn on_async_recv(&self, frame: Frame) {
        let socket_id = frame.field2;

        let unit = match decode_delivered_unit(&mut frame.payload.clone()) {
            Ok(unit) => unit,
            Err(e) => {
                warn!("discarding malformed data frame for socket {}: {}", socket_id, e);
                return;
            }
        };

        let Some(socket) = self.registry.get(socket_id).await else {
            warn!("discarding data frame for unknown socket {}", socket_id);
            return;
        };

        let wire_len = unit.wire_len();
        let source_group = unit.source_group.clone();
        if socket.inbound().offer(unit).await {
            trace!("queued {} bytes from {} for socket {}", wire_len, source_group, socket_id);
        }
        else {
            // the protocol has no way of pushing back on the middleware, so data is lost here
            error!("receive buffer of socket {} is full, dropping {} bytes from {}", socket_id, wire_len, source_group);
        }
    }
}
