//! Protocol error types.

use crate::message::MessageKind;
use thiserror::Error;

/// Protocol-level errors that can occur during framing or payload handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },

    #[error("failed to deserialize {kind}: {reason}")]
    Deserialization { kind: MessageKind, reason: String },

    #[error("failed to serialize {kind}: {reason}")]
    Serialization { kind: MessageKind, reason: String },

    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("unknown serializer: {0}")]
    UnknownSerializer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether the connection must be torn down after this error.
    ///
    /// Frame boundaries can no longer be trusted after an oversized length,
    /// and payload interpretation after a corrupt payload.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            ProtocolError::FrameTooLarge { .. }
            | ProtocolError::Deserialization { .. }
            | ProtocolError::UnexpectedMessage { .. }
            | ProtocolError::Io(_) => true,
            ProtocolError::Serialization { .. } | ProtocolError::UnknownSerializer(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ProtocolError::FrameTooLarge { size: 10, max: 5 }.is_connection_fatal());
        assert!(ProtocolError::Deserialization {
            kind: MessageKind::Response,
            reason: "eof".into(),
        }
        .is_connection_fatal());
        assert!(!ProtocolError::Serialization {
            kind: MessageKind::Request,
            reason: "bad".into(),
        }
        .is_connection_fatal());
        assert!(!ProtocolError::UnknownSerializer("xml".into()).is_connection_fatal());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));

        let err = ProtocolError::Deserialization {
            kind: MessageKind::Request,
            reason: "trailing characters".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to deserialize request: trailing characters"
        );

        let err = ProtocolError::UnexpectedMessage {
            expected: MessageKind::Response,
            actual: MessageKind::Request,
        };
        assert!(err.to_string().contains("expected response"));

        let err = ProtocolError::UnknownSerializer("xml".into());
        assert!(err.to_string().contains("xml"));
    }
}
