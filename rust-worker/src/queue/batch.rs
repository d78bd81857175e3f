//! Batch buffer and drain controller.
//!
//! Records are appended to an in-memory FIFO buffer. Once the buffer holds
//! `flush_threshold` records, the enqueuing caller drains it: batches of at
//! most `max_batch_size` records are removed from the front and delivered
//! concurrently, one retry chain per record, until the buffer is empty.
//!
//! ```text
//! enqueue → buffer ≥ threshold? → drain → [batch ≤ max] → deliver × N → re-check → ...
//! ```
//!
//! Only one drain pass runs at a time per queue. A drain that finds another
//! pass in flight returns immediately; the running pass re-checks the buffer
//! after clearing its flag, so records appended meanwhile are not stranded.
//! [`EmailQueue::flush`] is the shutdown path: it waits for any pass in
//! flight to finish and then drains whatever is left.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::delivery::{deliver_with_retry, Deliver, DeliveryOutcome, RetryPolicy};
use crate::error::DeliveryError;
use crate::queue::EmailRecord;

/// Fixed parameters of one queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Buffer length at which `enqueue` drains before returning
    pub flush_threshold: usize,
    /// Maximum records removed by one drain pass
    pub max_batch_size: usize,
    /// Per-record retry ceiling and backoff
    pub retry: RetryPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            flush_threshold: 50,
            max_batch_size: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// What one call to [`EmailQueue::drain`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub batches: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Lifetime counters of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub batches: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    batches: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<EmailRecord>,
    draining: bool,
}

/// Clears the drain flag when the pass ends, however it ends, and wakes
/// anyone waiting for the queue to go idle.
struct DrainGuard<'a> {
    state: &'a Mutex<QueueState>,
    idle: &'a Notify,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().draining = false;
        self.idle.notify_waiters();
    }
}

/// In-memory batching queue in front of one receiver.
pub struct EmailQueue<D> {
    name: String,
    settings: BatchSettings,
    sender: Arc<D>,
    state: Mutex<QueueState>,
    idle: Notify,
    counters: Counters,
}

impl<D: Deliver> EmailQueue<D> {
    pub fn new(name: impl Into<String>, settings: BatchSettings, sender: Arc<D>) -> Self {
        Self {
            name: name.into(),
            settings,
            sender,
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Number of records waiting in the buffer.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a drain pass is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Append a record; drain before returning once the threshold is reached.
    ///
    /// Never rejects. When another pass is already draining, the threshold
    /// drain is a no-op and that pass picks the record up.
    pub async fn enqueue(&self, email: EmailRecord) {
        let pending = {
            let mut state = self.state.lock();
            state.pending.push_back(email);
            state.pending.len()
        };
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

        debug!(queue = %self.name, pending = pending, "queue_enqueued");

        if pending >= self.settings.flush_threshold {
            info!(
                queue = %self.name,
                pending = pending,
                threshold = self.settings.flush_threshold,
                "queue_threshold_reached"
            );
            self.drain().await;
        }
    }

    /// Deliver batches until the buffer is empty or another pass holds the flag.
    pub async fn drain(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        while let Some((batch, guard)) = self.claim_batch() {
            let size = batch.len();
            info!(queue = %self.name, batch_size = size, "queue_batch_started");

            let (delivered, failed) = self.dispatch(batch).await;
            drop(guard);

            self.counters.batches.fetch_add(1, Ordering::Relaxed);
            self.counters.delivered.fetch_add(delivered, Ordering::Relaxed);
            self.counters.failed.fetch_add(failed, Ordering::Relaxed);

            summary.batches += 1;
            summary.delivered += delivered;
            summary.failed += failed;

            info!(
                queue = %self.name,
                batch_size = size,
                delivered = delivered,
                failed = failed,
                remaining = self.len(),
                "queue_batch_complete"
            );
        }

        summary
    }

    /// Wait until no drain pass is in flight.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the flag is read so a guard dropped in
            // between still wakes us.
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }

    /// Drain everything still buffered, waiting out passes owned by others.
    ///
    /// Unlike [`drain`](Self::drain), this does not return while another pass
    /// is in flight: it waits for that pass to end and then drains what is
    /// left, until the buffer is empty and no pass is running.
    pub async fn flush(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        loop {
            self.wait_idle().await;

            let pass = self.drain().await;
            summary.batches += pass.batches;
            summary.delivered += pass.delivered;
            summary.failed += pass.failed;

            let settled = {
                let state = self.state.lock();
                state.pending.is_empty() && !state.draining
            };
            if settled {
                return summary;
            }
        }
    }

    /// Take the next batch and the drain flag in one critical section.
    fn claim_batch(&self) -> Option<(Vec<EmailRecord>, DrainGuard<'_>)> {
        let mut state = self.state.lock();
        if state.draining || state.pending.is_empty() {
            return None;
        }

        state.draining = true;
        let take = self.settings.max_batch_size.max(1).min(state.pending.len());
        let batch = state.pending.drain(..take).collect();

        Some((
            batch,
            DrainGuard {
                state: &self.state,
                idle: &self.idle,
            },
        ))
    }

    /// Deliver every record of `batch` concurrently and wait for all of them.
    async fn dispatch(&self, batch: Vec<EmailRecord>) -> (u64, u64) {
        let mut tasks = JoinSet::new();
        for email in batch {
            let sender = Arc::clone(&self.sender);
            let policy = self.settings.retry;
            tasks.spawn(async move { deliver_with_retry(sender.as_ref(), &policy, &email).await });
        }

        let mut delivered = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!(queue = %self.name, error = %e, "delivery_task_aborted");
                DeliveryOutcome::Failed {
                    attempts: 0,
                    error: DeliveryError::Panicked(e.to_string()),
                }
            });

            if outcome.is_delivered() {
                delivered += 1;
            } else {
                failed += 1;
            }
        }

        (delivered, failed)
    }
}
