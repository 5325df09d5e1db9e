use thiserror::Error;

use crate::ipc::message_kind::ErrorCode;
use crate::ipc::SocketId;


#[derive(Debug, Error)]
pub enum ClientError {
    /// transport failure while connecting, during the handshake or on the established stream
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),
    #[error("middleware rejected protocol version {major}.{minor}")]
    IncompatibleMiddleware { major: u32, minor: u32 },
    #[error("connection to the middleware was lost")]
    ConnectionLost,
    #[error("protocol error: {0:#}")]
    Protocol(anyhow::Error),
    /// nonzero error code in the response to a sync request
    #[error("{operation} failed ({code}): {message}")]
    Middleware {
        operation: &'static str,
        code: ErrorCode,
        message: String,
    },
    #[error("payload of {len} bytes exceeds the maximum message size of {max} bytes")]
    OversizedPayload { len: usize, max: usize },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("socket {0} is closed")]
    SocketClosed(SocketId),
    #[error("invalid argument: {0:#}")]
    InvalidArgument(anyhow::Error),
}

impl ClientError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::ConnectionLost | ClientError::IncompatibleMiddleware { .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middleware_error_display() {
        let e = ClientError::Middleware {
            operation: "getInterfaces",
            code: ErrorCode::InternalInterfaceError,
            message: "bad index".to_string(),
        };
        assert_eq!(e.to_string(), "getInterfaces failed (internal interface error): bad index");
        assert!(!e.is_connection_error());
    }

    #[test]
    fn test_connection_error_classification() {
        let e: ClientError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(e.is_connection_error());
        assert!(ClientError::ConnectionLost.is_connection_error());
        assert!(!ClientError::Timeout("x").is_connection_error());
    }
}
