//! Error types for webhook delivery.

use thiserror::Error;

/// A single failed delivery attempt.
///
/// Every variant counts as one consumed attempt; the retry state machine does
/// not distinguish between a rejected request and a broken transport.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The receiver answered with a non-2xx status.
    #[error("webhook returned {status}")]
    Status { status: u16 },

    /// The request never produced a response (connect, timeout, body, ...).
    #[error("webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The task delivering the record panicked.
    #[error("delivery task panicked: {0}")]
    Panicked(String),
}

impl DeliveryError {
    /// HTTP status returned by the receiver, if one was returned at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status } => Some(*status),
            DeliveryError::Transport(e) => e.status().map(|s| s.as_u16()),
            DeliveryError::Panicked(_) => None,
        }
    }
}
