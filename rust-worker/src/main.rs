//! mailbatch server - accepts inbound email records over HTTP, batches them in
//! memory, and delivers them to the configured webhook with retries.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use url::Url;

use mailbatch::web::{self, AppState};
use mailbatch::{Config, Deliver, EmailQueue, QueueRegistry, WebhookSender, GLOBAL_QUEUE_NAME};

/// JSON logs, one object per event, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().json().flatten_event(true).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "server_starting");

    // Load configuration
    let config = Config::from_env();
    let settings = config.batch_settings();
    info!(
        port = config.port,
        flush_threshold = settings.flush_threshold,
        max_batch_size = settings.max_batch_size,
        max_retries = settings.retry.max_retries,
        base_delay_ms = config.base_delay_ms,
        request_timeout_ms = config.request_timeout_ms,
        inbound_auth_configured = config.inbound_auth_token.is_some(),
        "config_loaded"
    );

    let webhook_url = config
        .webhook_url
        .as_deref()
        .context("WEBHOOK_URL must be set")?;
    let webhook_url = Url::parse(webhook_url).context("WEBHOOK_URL is not a valid URL")?;

    let sender = WebhookSender::new(
        webhook_url,
        config.webhook_user_agent.clone(),
        config.request_timeout(),
    )?;
    info!(
        url = %sender.url(),
        user_agent = %sender.user_agent(),
        "webhook_sender_created"
    );

    // One queue for the whole process, reachable by name
    let mut registry = QueueRegistry::new();
    registry.register(EmailQueue::new(
        GLOBAL_QUEUE_NAME,
        settings,
        Arc::new(sender),
    ));
    info!(queues = ?registry.names(), "queue_registry_ready");

    let state = AppState::new(registry, config.inbound_auth_token.clone());
    let app = web::router(state.clone());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("Server error")?;

    // Inbound enqueues may still be running their threshold drain
    let joined = state.join_background().await;
    info!(tasks = joined, "inbound_tasks_joined");

    // Give records still below the threshold one last pass
    let summary = state.registry.flush_all().await;
    info!(
        batches = summary.batches,
        delivered = summary.delivered,
        failed = summary.failed,
        "server_shutdown_complete"
    );

    Ok(())
}

/// Resolves on SIGINT or SIGTERM; reports what the queues still hold so the
/// final flush can be followed in the logs.
async fn shutdown_signal<D: Deliver>(state: AppState<D>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    let pending: usize = state.registry.queues().map(|q| q.len()).sum();
    let draining = state.registry.queues().any(|q| q.is_draining());
    warn!(
        signal = signal,
        pending = pending,
        draining = draining,
        inbound_tasks = state.background_len(),
        "shutdown_requested_flushing_queues"
    );
}
