//! Client error types.

use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] tinyrpc_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("call {call_id} timed out after {timeout:?}")]
    CallTimeout { call_id: u64, timeout: Duration },

    #[error("send failed: {0}")]
    Send(std::io::Error),

    #[error("remote error (call {call_id}): {message}")]
    Remote { call_id: u64, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ClientError {
    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        ClientError::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::ConnectTimeout(_) => true,
            ClientError::CallTimeout { .. } => true,
            ClientError::ConnectionClosed { .. } => true,
            ClientError::Send(_) => true,
            _ => false,
        }
    }

    /// Returns whether the connection that produced this error is unusable.
    ///
    /// Call-scoped failures (timeouts, remote errors) leave it open.
    pub fn is_connection_error(&self) -> bool {
        match self {
            ClientError::Io(_)
            | ClientError::NotConnected
            | ClientError::ConnectionClosed { .. }
            | ClientError::Send(_) => true,
            ClientError::Protocol(e) => e.is_connection_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = ClientError::CallTimeout {
            call_id: 3,
            timeout: Duration::from_millis(50),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_connection_error());

        let remote = ClientError::Remote {
            call_id: 3,
            message: "boom".into(),
        };
        assert!(!remote.is_retryable());
        assert!(!remote.is_connection_error());

        let closed = ClientError::closed("connection closed");
        assert!(closed.is_retryable());
        assert!(closed.is_connection_error());
        assert_eq!(closed.to_string(), "connection closed: connection closed");
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::CallTimeout {
            call_id: 42,
            timeout: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("42"));

        let err = ClientError::Remote {
            call_id: 8,
            message: "unknown route: nope".into(),
        };
        assert!(err.to_string().contains("unknown route"));
    }
}
