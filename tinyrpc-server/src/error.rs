//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] tinyrpc_protocol::ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns whether this error ended a connection because of something the
    /// peer sent (as opposed to local I/O trouble or shutdown).
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            ServerError::Protocol(e) => e.is_connection_fatal(),
            _ => false,
        }
    }
}
