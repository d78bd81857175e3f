//! Queue module for in-memory batching.
//!
//! This module provides:
//! - The record type carried through the queue
//! - The batch buffer and drain controller
//! - A registry that hands out queue instances by name
//!
//! ## Architecture
//!
//! ```text
//! HTTP boundary → QueueRegistry["global-email-queue"] → EmailQueue → Deliver (webhook)
//! ```

pub mod batch;
pub mod registry;
pub mod types;

pub use batch::{BatchSettings, DrainSummary, EmailQueue, QueueStats};
pub use registry::QueueRegistry;
pub use types::{EmailRecord, DEFAULT_SUBJECT, GLOBAL_QUEUE_NAME};
