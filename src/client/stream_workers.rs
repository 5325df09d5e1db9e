use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::client::send_window::SendWindow;
use crate::client::socket_registry::SocketRegistry;
use crate::client::socket_state::SocketState;
use crate::connection::frame_reader::StreamSignal;


/// Entry points for ack and retransmit signals coming from the frame reader. Each kind has its
///  own queue and worker, so signals are never overwritten or reordered within their kind.
#[derive(Clone)]
pub struct StreamSignals {
    ack_tx: mpsc::Sender<StreamSignal>,
    retransmit_tx: mpsc::Sender<StreamSignal>,
}

impl StreamSignals {
    /// Waits for queue space rather than dropping a signal
    pub async fn ack(&self, signal: StreamSignal) {
        if self.ack_tx.send(signal).await.is_err() {
            debug!("ack worker is gone, ignoring {:?}", signal);
        }
    }

    pub async fn retransmit(&self, signal: StreamSignal) {
        if self.retransmit_tx.send(signal).await.is_err() {
            debug!("retransmit worker is gone, ignoring {:?}", signal);
        }
    }
}

pub fn spawn_stream_workers(registry: Arc<SocketRegistry>, queue_len: usize) -> (StreamSignals, Vec<JoinHandle<()>>) {
    let (ack_tx, ack_rx) = mpsc::channel(queue_len);
    let (retransmit_tx, retransmit_rx) = mpsc::channel(queue_len);

    let handles = vec![
        tokio::spawn(run_ack_worker(registry.clone(), ack_rx)),
        tokio::spawn(run_retransmit_worker(registry, retransmit_rx)),
    ];

    (StreamSignals { ack_tx, retransmit_tx }, handles)
}

async fn run_ack_worker(registry: Arc<SocketRegistry>, mut rx: mpsc::Receiver<StreamSignal>) {
    while let Some(signal) = rx.recv().await {
        apply_ack(&registry, signal).await;
    }
    trace!("ack worker shutting down");
}

async fn run_retransmit_worker(registry: Arc<SocketRegistry>, mut rx: mpsc::Receiver<StreamSignal>) {
    while let Some(signal) = rx.recv().await {
        apply_retransmit(&registry, signal).await;
    }
    trace!("retransmit worker shutting down");
}

async fn resolve(registry: &SocketRegistry, signal: &StreamSignal, what: &str) -> Option<(Arc<SocketState>, Arc<SendWindow>)> {
    let Some(socket) = registry.get(signal.socket_id).await else {
        warn!("protocol error: {} for unknown socket {}", what, signal.socket_id);
        return None;
    };
    let Some(window) = socket.send_window_for_stream(signal.stream_id).await else {
        warn!("protocol error: {} for unknown stream {} of socket {}", what, signal.stream_id, signal.socket_id);
        return None;
    };
    Some((socket, window))
}

pub async fn apply_ack(registry: &SocketRegistry, signal: StreamSignal) {
    if let Some((socket, window)) = resolve(registry, &signal, "cumulative ack").await {
        if window.ack(signal.value).await > 0 {
            socket.wake_senders();
        }
    }
}

pub async fn apply_retransmit(registry: &SocketRegistry, signal: StreamSignal) {
    if let Some((_, window)) = resolve(registry, &signal, "retransmit request").await {
        if let Err(e) = window.retransmit(signal.value).await {
            debug!("retransmit of #{} on stream {} failed: {}", signal.value, signal.stream_id, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::outbound_writer::outbound_channel;
    use crate::ipc::group_uri::GroupUri;
    use bytes::Bytes;
    use std::time::Duration;

    async fn setup() -> (Arc<SocketRegistry>, Arc<SocketState>, Arc<SendWindow>, mpsc::UnboundedReceiver<Bytes>) {
        let registry = Arc::new(SocketRegistry::new());
        let socket = Arc::new(SocketState::new(7, 1000));
        registry.register(socket.clone()).await.unwrap();

        let (outbound, rx) = outbound_channel();
        let window = Arc::new(SendWindow::new(7, 3, GroupUri::parse("ip://g").unwrap(), 10_000, outbound));
        socket.send_windows().write().await.insert(window.clone());
        for _ in 0..3 {
            window.add(Bytes::from_static(b"data")).await.unwrap();
        }
        (registry, socket, window, rx)
    }

    #[tokio::test]
    async fn test_ack_applied_and_senders_woken() {
        let (registry, socket, window, _rx) = setup().await;

        let freed = socket.window_freed();
        tokio::pin!(freed);
        freed.as_mut().enable();

        apply_ack(&registry, StreamSignal { socket_id: 7, stream_id: 3, value: 2 }).await;

        tokio::time::timeout(Duration::from_secs(1), freed).await.unwrap();
        let stats = window.stats().await;
        assert_eq!(stats.unacked_seqs, vec![2]);
        assert_eq!(stats.last_cumulative_ack, 2);
    }

    #[tokio::test]
    async fn test_signals_for_unknown_ids_are_ignored() {
        let (registry, _socket, window, mut rx) = setup().await;
        while rx.try_recv().is_ok() {}

        apply_ack(&registry, StreamSignal { socket_id: 8, stream_id: 3, value: 2 }).await;
        apply_ack(&registry, StreamSignal { socket_id: 7, stream_id: 4, value: 2 }).await;
        apply_retransmit(&registry, StreamSignal { socket_id: 8, stream_id: 3, value: 0 }).await;

        assert_eq!(window.stats().await.unacked_seqs, vec![0, 1, 2]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_workers_process_all_queued_signals() {
        let (registry, _socket, window, mut rx) = setup().await;
        while rx.try_recv().is_ok() {}

        let (signals, handles) = spawn_stream_workers(registry, 1);
        signals.retransmit(StreamSignal { socket_id: 7, stream_id: 3, value: 1 }).await;
        signals.retransmit(StreamSignal { socket_id: 7, stream_id: 3, value: 2 }).await;
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first[8..12], 1u32.to_le_bytes());
        assert_eq!(second[8..12], 2u32.to_le_bytes());

        signals.ack(StreamSignal { socket_id: 7, stream_id: 3, value: 1 }).await;
        signals.ack(StreamSignal { socket_id: 7, stream_id: 3, value: 3 }).await;
        drop(signals);
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(window.is_drained().await);
    }
}
