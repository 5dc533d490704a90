//! Submission outcomes and the delivery failure taxonomy.

use crate::delivery::transport::TransportError;

/// Why a submission did not deliver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    /// Network failure or timeout talking to the service
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// The service rejected the API key (HTTP 401)
    #[error("API key rejected (401)")]
    Auth,
    /// Any other non-200 status
    #[error("server returned status {0}")]
    Server(u16),
    /// No API key configured
    #[error("no API key configured")]
    ConfigMissing,
    /// Connection state is disconnected; no request was attempted
    #[error("not connected")]
    NotConnected,
}

impl DeliveryError {
    /// Guards short-circuit before any network I/O; they are idle states, not faults.
    pub const fn is_guard(&self) -> bool {
        matches!(self, Self::ConfigMissing | Self::NotConnected)
    }
}

/// Result of one submission attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// HTTP 200
    Delivered,
    /// HTTP 401; connection state has been flipped to disconnected
    Unauthorized,
    /// Anything else, including pre-submission guards
    Failed(DeliveryError),
}

impl SubmitOutcome {
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl std::fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}
