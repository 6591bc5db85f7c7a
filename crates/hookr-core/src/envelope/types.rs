//! Canonical envelope types.

use serde_json::Value;

use crate::event::HookEvent;

/// One decoded unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Server acknowledgement that the session is established.
    Connected,
    /// A webhook was invoked.
    HookCalled(HookEvent),
    /// Server-side error notification.
    Error(ServerError),
    Ping,
    Pong,
    /// Category this client does not understand.
    Unknown { category: String, raw: Value },
}

impl Envelope {
    /// Stable category name used in logs.
    pub fn category(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::HookCalled(_) => "hook-called",
            Self::Error(_) => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown { category, .. } => category,
        }
    }
}

/// Error reported by the service inside an `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Machine-readable code, lowercased (empty when the service sent none).
    pub code: String,
    pub message: String,
}

impl ServerError {
    /// Whether the service is rejecting the client credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self.code.as_str(),
            "unauthorized" | "forbidden" | "invalid_key" | "auth_failed"
        )
    }
}
