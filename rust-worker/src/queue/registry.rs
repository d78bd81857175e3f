//! Named queue instances.
//!
//! Callers never reach a queue through global state; the server builds the
//! registry once and passes it down, and handlers look queues up by name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{DrainSummary, EmailQueue};
use crate::delivery::Deliver;

/// Queues keyed by their well-known name.
pub struct QueueRegistry<D> {
    queues: HashMap<String, Arc<EmailQueue<D>>>,
}

impl<D> Default for QueueRegistry<D> {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }
}

impl<D: Deliver> QueueRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under its own name, returning the shared handle.
    ///
    /// A queue registered under an existing name replaces the previous one.
    pub fn register(&mut self, queue: EmailQueue<D>) -> Arc<EmailQueue<D>> {
        let name = queue.name().to_string();
        let queue = Arc::new(queue);

        if self.queues.insert(name.clone(), Arc::clone(&queue)).is_some() {
            warn!(queue = %name, "queue_registration_replaced");
        } else {
            info!(queue = %name, "queue_registered");
        }

        queue
    }

    pub fn get(&self, name: &str) -> Option<Arc<EmailQueue<D>>> {
        self.queues.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queues.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn queues(&self) -> impl Iterator<Item = &Arc<EmailQueue<D>>> {
        self.queues.values()
    }

    /// Flush every registered queue in turn, waiting out passes in flight.
    pub async fn flush_all(&self) -> DrainSummary {
        let mut total = DrainSummary::default();

        for queue in self.queues() {
            info!(queue = %queue.name(), pending = queue.len(), "queue_final_flush");
            let summary = queue.flush().await;
            total.batches += summary.batches;
            total.delivered += summary.delivered;
            total.failed += summary.failed;
        }

        total
    }
}
