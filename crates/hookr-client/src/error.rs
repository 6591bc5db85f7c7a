//! Relay client error taxonomy.

/// Errors produced by the relay client.
///
/// Failures during [`connect`](crate::RelayClient::connect) are returned to
/// the caller. Everything after that is routed to `on_error` observers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    /// Endpoint unreachable, invalid address, or handshake timeout.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service rejected the client key.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Malformed or incomplete inbound frame. The connection stays up.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The transport dropped mid-session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-fatal error reported by the service itself.
    #[error("Server error [{code}]: {message}")]
    Server { code: String, message: String },

    #[error("Relay client is already connecting or connected")]
    AlreadyConnected,
}

impl RelayError {
    /// Whether a reconnect attempt could succeed after this error.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transport(_))
    }
}

impl From<hookr_core::Error> for RelayError {
    fn from(err: hookr_core::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RelayError::Connection("x".into()).is_retryable());
        assert!(RelayError::Transport("x".into()).is_retryable());
        assert!(!RelayError::Authentication("x".into()).is_retryable());
        assert!(!RelayError::Protocol("x".into()).is_retryable());
        assert!(!RelayError::AlreadyConnected.is_retryable());
    }

    #[test]
    fn core_errors_become_protocol_errors() {
        let core = hookr_core::Error::MissingField {
            category: "hook-called",
            field: "hookId",
        };
        let err = RelayError::from(core);
        assert!(matches!(err, RelayError::Protocol(ref m) if m.contains("hookId")));
    }
}
