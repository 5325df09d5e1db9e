use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::error;

use crate::error::ClientError;


/// Callback the application registers to learn that the connection to the middleware is gone.
///  It is invoked at most once, from a background task.
pub type ConnectionLostHandler = Box<dyn FnOnce(&ClientError) + Send + 'static>;

/// Tracks whether the connection is still usable and fires the connection-lost notification
///  exactly once, regardless of how many tasks observe the failure
pub struct ConnectionState {
    lost: AtomicBool,
    handler: Mutex<Option<ConnectionLostHandler>>,
}

impl ConnectionState {
    pub fn new(handler: Option<ConnectionLostHandler>) -> ConnectionState {
        ConnectionState {
            lost: AtomicBool::new(false),
            handler: Mutex::new(handler),
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Returns `true` for the first caller only
    pub fn mark_lost(&self, cause: &ClientError) -> bool {
        if self.lost.swap(true, Ordering::AcqRel) {
            return false;
        }

        error!("connection to middleware lost: {}", cause);
        let handler = self.handler.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handler) = handler {
            handler(cause);
        }
        true
    }

    pub fn check(&self) -> Result<(), ClientError> {
        if self.is_lost() {
            return Err(ClientError::ConnectionLost);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_handler_called_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let state = ConnectionState::new(Some(Box::new(move |e| {
            assert!(matches!(e, ClientError::ConnectionLost));
            calls2.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(state.check().is_ok());
        assert!(state.mark_lost(&ClientError::ConnectionLost));
        assert!(!state.mark_lost(&ClientError::ConnectionLost));
        assert!(state.is_lost());
        assert!(matches!(state.check(), Err(ClientError::ConnectionLost)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_handler() {
        let state = ConnectionState::new(None);
        assert!(state.mark_lost(&ClientError::ConnectionLost));
        assert!(state.is_lost());
    }
}
