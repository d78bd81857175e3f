//! Record types carried through the batching queue.

use serde::{Deserialize, Serialize};

/// Name under which the process-wide queue is registered.
pub const GLOBAL_QUEUE_NAME: &str = "global-email-queue";

/// Subject used when an inbound message carries none.
pub const DEFAULT_SUBJECT: &str = "(No subject)";

/// One inbound email waiting for delivery.
///
/// Records have no identity beyond their position in the buffer; two
/// identical records are delivered twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain text body
    #[serde(default)]
    pub text: String,
    /// HTML body
    #[serde(default)]
    pub html: String,
}

impl EmailRecord {
    /// Create a new record.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: html.into(),
        }
    }
}
