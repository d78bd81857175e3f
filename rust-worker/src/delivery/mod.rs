//! Delivery of queued records to the downstream receiver.
//!
//! This module provides:
//! - The `Deliver` capability the queue hands each record to
//! - `WebhookSender`, the HTTP implementation used in production
//! - The per-record retry state machine with exponential backoff

pub mod retry;
pub mod webhook;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::queue::EmailRecord;

pub use retry::{deliver_with_retry, DeliveryOutcome, DeliveryState, RetryPolicy};
pub use webhook::{WebhookSender, DEFAULT_USER_AGENT};

/// A single outbound delivery call.
///
/// Implementations make exactly one attempt; retries are driven by
/// [`deliver_with_retry`].
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    /// Hand one record to the receiver.
    async fn deliver(&self, email: &EmailRecord) -> Result<(), DeliveryError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory receiver shared by the queue and retry tests.

    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;
    use tokio::time::Instant;

    use super::Deliver;
    use crate::error::DeliveryError;
    use crate::queue::EmailRecord;

    /// One call observed by the receiver.
    #[derive(Debug, Clone)]
    pub struct Attempt {
        pub subject: String,
        pub at: Instant,
    }

    #[derive(Default)]
    pub struct ScriptedSender {
        attempts: Mutex<Vec<Attempt>>,
        counts: Mutex<HashMap<String, u32>>,
        always_fail: HashSet<String>,
        unreachable: HashSet<String>,
        fail_first: u32,
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedSender {
        /// Accept every record.
        pub fn accepting() -> Self {
            Self::default()
        }

        /// Reject every attempt for records with one of these subjects.
        pub fn failing_subjects(subjects: &[&str]) -> Self {
            Self {
                always_fail: subjects.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        /// Fail every attempt for these subjects before any response exists,
        /// the way a refused connection does.
        pub fn unreachable_subjects(subjects: &[&str]) -> Self {
            Self {
                unreachable: subjects.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        /// Reject the first `n` attempts of every record.
        pub fn flaky(n: u32) -> Self {
            Self {
                fail_first: n,
                ..Self::default()
            }
        }

        /// Block every call until the semaphore hands out a permit.
        pub fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> Vec<Attempt> {
            self.attempts.lock().clone()
        }

        pub fn attempts_for(&self, subject: &str) -> Vec<Attempt> {
            self.attempts
                .lock()
                .iter()
                .filter(|a| a.subject == subject)
                .cloned()
                .collect()
        }

        pub fn subjects(&self) -> Vec<String> {
            self.attempts.lock().iter().map(|a| a.subject.clone()).collect()
        }
    }

    #[async_trait]
    impl Deliver for ScriptedSender {
        async fn deliver(&self, email: &EmailRecord) -> Result<(), DeliveryError> {
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|_| DeliveryError::Status { status: 503 })?
                    .forget();
            }

            self.attempts.lock().push(Attempt {
                subject: email.subject.clone(),
                at: Instant::now(),
            });

            let seen = {
                let mut counts = self.counts.lock();
                let count = counts.entry(email.subject.clone()).or_insert(0);
                *count += 1;
                *count
            };

            if self.unreachable.contains(&email.subject) {
                return Err(transport_error());
            }

            if self.always_fail.contains(&email.subject) || seen <= self.fail_first {
                return Err(DeliveryError::Status { status: 500 });
            }

            Ok(())
        }
    }

    /// A genuine `reqwest::Error` raised before any response was received.
    pub fn transport_error() -> DeliveryError {
        let err = reqwest::Client::new()
            .post("not a url")
            .build()
            .expect_err("an unparsable URL cannot build a request");
        DeliveryError::from(err)
    }

    /// Record with a distinguishing subject.
    pub fn email(subject: &str) -> EmailRecord {
        EmailRecord::new(
            "sender@example.com",
            "inbox@example.com",
            subject,
            "text",
            "<p>html</p>",
        )
    }
}
