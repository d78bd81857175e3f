//! Configuration module for environment variable parsing.
//!
//! All settings come from environment variables. Missing or invalid values
//! fall back to defaults with a warning; only `WEBHOOK_URL` has no default and
//! is validated when the server starts.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::delivery::{RetryPolicy, DEFAULT_USER_AGENT};
use crate::queue::BatchSettings;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination URL every queued record is posted to
    pub webhook_url: Option<String>,

    /// Client label sent as the User-Agent header
    pub webhook_user_agent: String,

    /// Buffer length that triggers a flush on enqueue
    pub flush_threshold: usize,

    /// Maximum records removed per drain pass
    pub max_batch_size: usize,

    /// Retries per record after the first attempt
    pub max_retries: u32,

    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Port for the web server to listen on
    pub port: u16,

    /// Shared secret expected in X-Custom-Auth on /inbound
    pub inbound_auth_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|v| !v.trim().is_empty()),

            webhook_user_agent: env::var("WEBHOOK_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),

            flush_threshold: parse_positive("FLUSH_THRESHOLD", 50),

            max_batch_size: parse_positive("MAX_BATCH_SIZE", 100),

            max_retries: parse_or("MAX_RETRIES", 3),

            base_delay_ms: parse_or("BASE_DELAY_MS", 1000),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 30000),

            port: parse_or("PORT", 8080),

            inbound_auth_token: env::var("INBOUND_AUTH_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Queue parameters derived from this configuration.
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            flush_threshold: self.flush_threshold,
            max_batch_size: self.max_batch_size,
            retry: RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Parse an environment variable, warning and falling back on bad input.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Like `parse_or`, but zero is rejected as well.
fn parse_positive(name: &str, default: usize) -> usize {
    match parse_or(name, default) {
        0 => {
            warn!(env_var = name, "Value must be at least 1, using default");
            default
        }
        v => v,
    }
}
