use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::connection::outbound_writer::OutboundSender;
use crate::error::ClientError;
use crate::ipc::frame::Frame;
use crate::ipc::group_uri::GroupUri;
use crate::ipc::{SequenceNumber, SocketId, StreamId};


struct SendWindowInner {
    next_seq: SequenceNumber,
    unacked: BTreeMap<SequenceNumber, Frame>,
    last_cumulative_ack: SequenceNumber,
    /// capacity minus the wire size of all frames in `unacked`
    available_budget: usize,
}

/// Outbound buffer of one send stream, i.e. one (socket, destination group) pair.
///
/// Frames stay buffered until the middleware acknowledges them cumulatively, so they can be
///  retransmitted unchanged on request. Their total wire size is bounded by the window's capacity.
pub struct SendWindow {
    socket_id: SocketId,
    stream_id: StreamId,
    destination: GroupUri,
    capacity: usize,
    outbound: OutboundSender,
    inner: Mutex<SendWindowInner>,
}

impl SendWindow {
    pub fn new(socket_id: SocketId, stream_id: StreamId, destination: GroupUri, capacity: usize, outbound: OutboundSender) -> SendWindow {
        SendWindow {
            socket_id,
            stream_id,
            destination,
            capacity,
            outbound,
            inner: Mutex::new(SendWindowInner {
                next_seq: 0,
                unacked: Default::default(),
                last_cumulative_ack: 0,
                available_budget: capacity,
            }),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn destination(&self) -> &GroupUri {
        &self.destination
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sends `data` as the next frame of this stream if the remaining budget is strictly larger
    ///  than the frame's wire size. Returns `Ok(false)` without any change otherwise.
    pub async fn add(&self, data: Bytes) -> Result<bool, ClientError> {
        let mut inner = self.inner.lock().await;

        let seq = inner.next_seq;
        let frame = Frame::async_send(self.stream_id, self.socket_id, seq, data);
        let wire_len = frame.wire_len();
        if inner.available_budget <= wire_len {
            trace!("send window for stream {} is full: {} bytes available, frame needs {}", self.stream_id, inner.available_budget, wire_len);
            return Ok(false);
        }

        // written while holding the lock so frames go out in sequence order
        self.outbound.send_frame(&frame)?;

        inner.unacked.insert(seq, frame);
        inner.next_seq = seq.wrapping_add(1);
        inner.available_budget -= wire_len;
        trace!("sent #{} on stream {}, {} bytes budget left", seq, self.stream_id, inner.available_budget);
        Ok(true)
    }

    /// Releases all frames with sequence numbers below `cumulative_ack`. Values below the last
    ///  cumulative ack are stale and ignored, and so are values beyond the next sequence number
    ///  since nothing has been sent there. Returns the number of released frames.
    pub async fn ack(&self, cumulative_ack: SequenceNumber) -> usize {
        let mut inner = self.inner.lock().await;

        if cumulative_ack < inner.last_cumulative_ack {
            debug!("ignoring stale ack {} on stream {}, already acked up to {}", cumulative_ack, self.stream_id, inner.last_cumulative_ack);
            return 0;
        }
        if cumulative_ack > inner.next_seq {
            warn!("ignoring ack {} on stream {}: only sent up to #{}", cumulative_ack, self.stream_id, inner.next_seq);
            return 0;
        }

        let still_unacked = inner.unacked.split_off(&cumulative_ack);
        let acked = std::mem::replace(&mut inner.unacked, still_unacked);

        let released: usize = acked.values()
            .map(|frame| frame.wire_len())
            .sum();
        inner.available_budget += released;
        inner.last_cumulative_ack = cumulative_ack;

        trace!("ack {} on stream {} released {} frames / {} bytes", cumulative_ack, self.stream_id, acked.len(), released);
        acked.len()
    }

    /// Resends an unacknowledged frame unchanged. Returns `Ok(false)` if it was acked already.
    pub async fn retransmit(&self, seq: SequenceNumber) -> Result<bool, ClientError> {
        let inner = self.inner.lock().await;

        match inner.unacked.get(&seq) {
            Some(frame) => {
                debug!("retransmitting #{} on stream {}", seq, self.stream_id);
                self.outbound.send_frame(frame)?;
                Ok(true)
            }
            None => {
                debug!("retransmit request for #{} on stream {}: not in send window", seq, self.stream_id);
                Ok(false)
            }
        }
    }

    pub async fn is_drained(&self) -> bool {
        self.inner.lock().await
            .unacked.is_empty()
    }

    pub async fn stats(&self) -> SendWindowStats {
        let inner = self.inner.lock().await;
        SendWindowStats {
            next_seq: inner.next_seq,
            last_cumulative_ack: inner.last_cumulative_ack,
            unacked_seqs: inner.unacked.keys().copied().collect(),
            unacked_bytes: inner.unacked.values().map(|f| f.wire_len()).sum(),
            available_budget: inner.available_budget,
        }
    }
}

/// A consistent snapshot of a send window's state
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendWindowStats {
    pub next_seq: SequenceNumber,
    pub last_cumulative_ack: SequenceNumber,
    pub unacked_seqs: Vec<SequenceNumber>,
    pub unacked_bytes: usize,
    pub available_budget: usize,
}
