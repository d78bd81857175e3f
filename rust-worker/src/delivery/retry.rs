//! Per-record delivery with bounded, exponentially delayed retries.
//!
//! A record starts in `Attempting(0)`. Each failed attempt either waits
//! `base_delay * 2^n` and moves to `Attempting(n + 1)`, or, once `n` reaches
//! `max_retries`, ends in `PermanentlyFailed`. The first successful attempt
//! ends in `Succeeded`. Outcomes belong to one record only.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use super::Deliver;
use crate::error::DeliveryError;
use crate::queue::EmailRecord;

/// Retry ceiling and backoff unit for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-based).
    ///
    /// Unjittered and uncapped; saturates at `Duration::MAX` instead of
    /// overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether a failure at `attempt` is followed by another attempt.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Position of one record in its delivery chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Attempting(u32),
    Succeeded,
    PermanentlyFailed,
}

/// Terminal result of one record's delivery chain.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: DeliveryError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Deliver one record, retrying failed attempts per `policy`.
///
/// Never returns an error: a record whose retries run out comes back as
/// [`DeliveryOutcome::Failed`] carrying the last attempt's error.
pub async fn deliver_with_retry<D>(
    sender: &D,
    policy: &RetryPolicy,
    email: &EmailRecord,
) -> DeliveryOutcome
where
    D: Deliver + ?Sized,
{
    let mut state = DeliveryState::Attempting(0);
    let mut attempts = 0;
    let mut last_error = None;

    while let DeliveryState::Attempting(attempt) = state {
        attempts += 1;
        match sender.deliver(email).await {
            Ok(()) => {
                info!(
                    to = %email.to,
                    subject = %email.subject,
                    attempt = attempt,
                    "delivery_succeeded"
                );
                state = DeliveryState::Succeeded;
            }
            Err(e) if policy.should_retry(attempt) => {
                let delay = policy.backoff(attempt);
                warn!(
                    to = %email.to,
                    attempt = attempt,
                    status = ?e.status(),
                    error = %e,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "delivery_attempt_failed"
                );
                sleep(delay).await;
                state = DeliveryState::Attempting(attempt + 1);
            }
            Err(e) => {
                error!(
                    to = %email.to,
                    subject = %email.subject,
                    attempts = attempt + 1,
                    error = %e,
                    "delivery_permanently_failed"
                );
                last_error = Some(e);
                state = DeliveryState::PermanentlyFailed;
            }
        }
    }

    match last_error {
        Some(error) => DeliveryOutcome::Failed { attempts, error },
        None => DeliveryOutcome::Delivered { attempts },
    }
}
