//! mailbatch - in-memory email batching with retrying webhook delivery.
//!
//! Records arrive one at a time over HTTP, accumulate in a buffer, and are
//! flushed in bounded batches to a single webhook receiver. Each record gets
//! its own retry chain with exponential backoff; one record's failure never
//! holds up the rest of its batch.
//!
//! ## Architecture
//!
//! ```text
//! HTTP → web → QueueRegistry → EmailQueue (buffer + drain) → deliver_with_retry → WebhookSender
//! ```
//!
//! Queued records live in memory only and are lost on restart.

pub mod config;
pub mod delivery;
pub mod error;
pub mod process;
pub mod queue;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use delivery::{Deliver, DeliveryOutcome, RetryPolicy, WebhookSender};
pub use error::DeliveryError;
pub use queue::{BatchSettings, EmailQueue, EmailRecord, QueueRegistry, GLOBAL_QUEUE_NAME};
pub use web::AppState;
