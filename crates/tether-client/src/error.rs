use std::time::Duration;

use tether_shared::ws_protocol::{CLOSE_AUTH_FAILED, CLOSE_SESSION_NOT_FOUND};

/// Connection-layer errors. Terminal variants stop reconnection and are
/// broadcast to every queued send, so the type is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication rejected by server")]
    AuthFailed,
    #[error("session not found on server")]
    SessionNotFound,
    #[error("gave up after maximum reconnection attempts")]
    MaxReconnectAttempts,
    #[error("outbound queue is full")]
    QueueOverflow,
    #[error("message too large for outbound queue")]
    MessageTooLarge,
    #[error("client closed")]
    Closed,
    #[error("send timed out")]
    SendTimeout,
}

impl SessionError {
    /// Terminal errors reject all queued sends and suppress reconnection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed | Self::SessionNotFound | Self::MaxReconnectAttempts | Self::Closed
        )
    }

    /// Map a semantic close code onto its terminal error, if any.
    /// Recoverable closes (normal or abnormal) return `None`.
    pub fn from_close_code(code: u16) -> Option<Self> {
        match code {
            CLOSE_AUTH_FAILED => Some(Self::AuthFailed),
            CLOSE_SESSION_NOT_FOUND => Some(Self::SessionNotFound),
            _ => None,
        }
    }
}
