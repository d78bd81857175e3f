//! HTTP endpoint handlers.
//!
//! `/queue` accepts an already extracted record and waits for the enqueue,
//! including any threshold drain it triggers. `/inbound` accepts a raw
//! message, extracts it, and queues it in a background task that the state
//! keeps track of, so shutdown can wait for it.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::delivery::Deliver;
use crate::process::extract_email;
use crate::queue::{EmailQueue, EmailRecord, QueueRegistry, QueueStats, GLOBAL_QUEUE_NAME};
use crate::web::auth::check_custom_auth;

/// Shared application state.
pub struct AppState<D> {
    pub registry: Arc<QueueRegistry<D>>,
    pub inbound_auth_token: Option<Arc<str>>,
    background: Arc<Mutex<JoinSet<()>>>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            inbound_auth_token: self.inbound_auth_token.clone(),
            background: Arc::clone(&self.background),
        }
    }
}

impl<D: Deliver> AppState<D> {
    pub fn new(registry: QueueRegistry<D>, inbound_auth_token: Option<String>) -> Self {
        Self {
            registry: Arc::new(registry),
            inbound_auth_token: inbound_auth_token.map(Arc::from),
            background: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// The process-wide queue every inbound record is routed to.
    pub fn global_queue(&self) -> Option<Arc<EmailQueue<D>>> {
        self.registry.get(GLOBAL_QUEUE_NAME)
    }

    /// Run `task` detached from the request, but tracked until shutdown.
    pub fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.background.lock();
        // Reap finished tasks so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Number of tracked background tasks not yet reaped.
    pub fn background_len(&self) -> usize {
        self.background.lock().len()
    }

    /// Wait for every tracked background task; returns how many were joined.
    ///
    /// Called once the server has stopped accepting requests, so nothing is
    /// spawned behind it.
    pub async fn join_background(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.background.lock());
        let mut joined = 0;

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "background_task_failed");
            }
            joined += 1;
        }

        joined
    }
}

/// Response body for the write endpoints.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn reply(code: StatusCode, status: &'static str) -> (StatusCode, Json<WebhookResponse>) {
        (code, Json(WebhookResponse { status, error: None }))
    }

    fn failure(error: String) -> (StatusCode, Json<WebhookResponse>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse {
                status: "error",
                error: Some(error),
            }),
        )
    }
}

// =============================================================================
// Health & Stats
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue: String,
    pub pending: usize,
    pub draining: bool,
}

/// Health check endpoint.
pub async fn health<D: Deliver>(State(state): State<AppState<D>>) -> impl IntoResponse {
    match state.global_queue() {
        Some(queue) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                queue: queue.name().to_string(),
                pending: queue.len(),
                draining: queue.is_draining(),
            }),
        )
            .into_response(),
        None => WebhookResponse::failure("queue not registered".to_string()).into_response(),
    }
}

/// Queue counters response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub queue: String,
    pub pending: usize,
    #[serde(flatten)]
    pub stats: QueueStats,
}

/// Lifetime counters of the global queue.
pub async fn stats<D: Deliver>(State(state): State<AppState<D>>) -> impl IntoResponse {
    match state.global_queue() {
        Some(queue) => Json(StatsResponse {
            queue: queue.name().to_string(),
            pending: queue.len(),
            stats: queue.stats(),
        })
        .into_response(),
        None => WebhookResponse::failure("queue not registered".to_string()).into_response(),
    }
}

// =============================================================================
// Queue endpoint
// =============================================================================

/// Enqueue an extracted record.
///
/// Responds once the record is buffered; when it brings the buffer to the
/// flush threshold, that includes the drain it triggers.
pub async fn enqueue_email<D: Deliver>(
    State(state): State<AppState<D>>,
    Json(email): Json<EmailRecord>,
) -> impl IntoResponse {
    let Some(queue) = state.global_queue() else {
        error!(queue = GLOBAL_QUEUE_NAME, "queue_not_registered");
        return WebhookResponse::failure("queue not registered".to_string());
    };

    info!(
        from = %email.from,
        to = %email.to,
        subject = %email.subject,
        "queue_request_received"
    );

    queue.enqueue(email).await;

    WebhookResponse::reply(StatusCode::ACCEPTED, "queued")
}

// =============================================================================
// Inbound email endpoint
// =============================================================================

/// Raw inbound message as forwarded by the email router.
#[derive(Debug, Deserialize)]
pub struct InboundPayload {
    #[serde(rename = "from")]
    pub from_field: String,
    pub to: String,
    pub raw_content: String,
}

/// Extract a raw message and queue it without waiting for delivery.
pub async fn inbound_email<D: Deliver>(
    State(state): State<AppState<D>>,
    headers: HeaderMap,
    Json(payload): Json<InboundPayload>,
) -> impl IntoResponse {
    info!(
        from = %payload.from_field,
        to = %payload.to,
        raw_content_length = payload.raw_content.len(),
        "inbound_email_received"
    );

    let auth = check_custom_auth(&headers, state.inbound_auth_token.as_deref());
    if !auth.is_allowed() {
        warn!(to = %payload.to, check = ?auth, "inbound_auth_rejected");
        return WebhookResponse::reply(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let email = match extract_email(&payload.from_field, &payload.to, &payload.raw_content) {
        Ok(email) => email,
        Err(e) => {
            error!(to = %payload.to, error = %e, "inbound_extract_failed");
            return WebhookResponse::failure(format!("{:#}", e));
        }
    };

    let Some(queue) = state.global_queue() else {
        error!(queue = GLOBAL_QUEUE_NAME, "queue_not_registered");
        return WebhookResponse::failure("queue not registered".to_string());
    };

    state.spawn_background(async move {
        queue.enqueue(email).await;
    });

    WebhookResponse::reply(StatusCode::ACCEPTED, "accepted")
}
