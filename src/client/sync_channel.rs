use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::connection::connection_state::ConnectionState;
use crate::connection::outbound_writer::OutboundSender;
use crate::error::ClientError;
use crate::ipc::frame::Frame;
use crate::ipc::message_kind::{ErrorCode, FunctionId};
use crate::ipc::wire_codec::decode_error_message;


struct PendingExchange {
    request_id: u32,
    function_id: FunctionId,
    response: oneshot::Sender<Frame>,
}

/// Request / response exchanges with the middleware. There is at most one exchange in flight:
///  callers hold `exchange_lock` for the entire round trip.
///
/// Requests carry an incrementing id in `field2` which the middleware echoes. It is not used for
///  pipelining, but to discard a late response to a request that already timed out.
pub struct SyncChannel {
    exchange_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingExchange>>,
    next_request_id: AtomicU32,
    outbound: OutboundSender,
    connection: Arc<ConnectionState>,
    timeout: Option<Duration>,
}

impl SyncChannel {
    pub fn new(outbound: OutboundSender, connection: Arc<ConnectionState>, timeout: Option<Duration>) -> SyncChannel {
        SyncChannel {
            exchange_lock: Default::default(),
            pending: Default::default(),
            next_request_id: AtomicU32::new(1),
            outbound,
            connection,
            timeout,
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingExchange>> {
        self.pending.lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a request and returns the raw response frame, regardless of its error code
    pub async fn request(&self, function_id: FunctionId, payload: Bytes) -> Result<Frame, ClientError> {
        let _exchange_guard = self.exchange_lock.lock().await;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        *self.pending() = Some(PendingExchange {
            request_id,
            function_id,
            response: tx,
        });

        // checked after registering so that a concurrent connection loss either sees the
        //  pending exchange or is seen here
        if let Err(e) = self.connection.check()
            .and_then(|_| self.outbound.send_frame(&Frame::sync_request(function_id, request_id, payload)))
        {
            self.pending().take();
            return Err(e);
        }
        trace!("sent {} request #{}", function_id.operation_name(), request_id);

        let response = match self.timeout {
            None => rx.await,
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(response) => response,
                Err(_) => {
                    self.pending().take();
                    warn!("no response to {} request #{} within {:?}", function_id.operation_name(), request_id, timeout);
                    return Err(ClientError::Timeout(function_id.operation_name()));
                }
            }
        };

        // the sender is only dropped without a response when the connection is lost
        response.map_err(|_| ClientError::ConnectionLost)
    }

    /// Sends a request and returns the response payload, translating a nonzero error code into
    ///  [ClientError::Middleware]
    pub async fn call(&self, function_id: FunctionId, payload: Bytes) -> Result<Bytes, ClientError> {
        let response = self.request(function_id, payload).await?;
        match ErrorCode::from(response.field1) {
            ErrorCode::None => Ok(response.payload),
            code => {
                let message = decode_error_message(&mut response.payload.clone())
                    .unwrap_or_else(|e| format!("<undecodable error message: {}>", e));
                debug!("{} failed: {} - {}", function_id.operation_name(), code, message);
                Err(ClientError::Middleware {
                    operation: function_id.operation_name(),
                    code,
                    message,
                })
            }
        }
    }

    /// called by the frame reader for every sync response
    pub fn on_response(&self, frame: Frame) {
        let mut pending = self.pending();
        match pending.take() {
            Some(exchange) if exchange.request_id == frame.field2 => {
                trace!("received response to {} request #{}", exchange.function_id.operation_name(), exchange.request_id);
                if exchange.response.send(frame).is_err() {
                    debug!("requester of #{} is gone, discarding response", exchange.request_id);
                }
            }
            Some(exchange) => {
                warn!("discarding stale sync response for request #{} while waiting for #{}", frame.field2, exchange.request_id);
                *pending = Some(exchange);
            }
            None => {
                warn!("discarding sync response for request #{}: no request pending", frame.field2);
            }
        }
    }

    /// Fails a pending exchange with [ClientError::ConnectionLost]
    pub fn fail_pending(&self) {
        if let Some(exchange) = self.pending().take() {
            debug!("failing pending {} request #{}", exchange.function_id.operation_name(), exchange.request_id);
        }
    }
}
