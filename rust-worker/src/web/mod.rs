//! Web server module for accepting records into the queue.
//!
//! This module provides the HTTP boundary in front of the queue:
//! - `POST /queue` for already extracted records
//! - `POST /inbound` for raw messages from the email router
//! - `GET /health` and `GET /stats` for operators
//!
//! Malformed bodies and unsupported methods are rejected by the router and
//! never reach the buffer.

pub mod auth;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::delivery::Deliver;

pub use auth::{check_custom_auth, AuthCheck, AUTH_HEADER};
pub use handlers::{
    enqueue_email, health, inbound_email, stats, AppState, HealthResponse, InboundPayload,
    StatsResponse, WebhookResponse,
};

/// Build the router over `state`.
pub fn router<D: Deliver>(state: AppState<D>) -> Router {
    Router::new()
        .route("/health", get(health::<D>))
        .route("/stats", get(stats::<D>))
        .route("/queue", post(enqueue_email::<D>))
        .route("/inbound", post(inbound_email::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
