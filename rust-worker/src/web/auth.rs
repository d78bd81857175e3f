//! Shared-secret check for the inbound email endpoint.
//!
//! The upstream email router sends the secret in the `X-Custom-Auth` header.
//! When no secret is configured every request is let through.

use axum::http::HeaderMap;
use tracing::warn;

/// Header carrying the shared secret.
pub const AUTH_HEADER: &str = "X-Custom-Auth";

/// Result of checking a request's auth header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCheck {
    /// Header matches the configured secret
    Allowed,
    /// No secret configured
    NotConfigured,
    /// Secret configured but header absent
    Missing,
    /// Header present but wrong
    Invalid,
}

impl AuthCheck {
    pub fn is_allowed(self) -> bool {
        matches!(self, AuthCheck::Allowed | AuthCheck::NotConfigured)
    }
}

/// Compare the request's auth header with the expected secret.
pub fn check_custom_auth(headers: &HeaderMap, expected: Option<&str>) -> AuthCheck {
    let provided = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok());

    match (provided, expected) {
        (_, None) => {
            warn!("inbound_auth_not_configured");
            AuthCheck::NotConfigured
        }
        (None, Some(_)) => AuthCheck::Missing,
        (Some(provided), Some(expected)) if secrets_match(provided, expected) => AuthCheck::Allowed,
        (Some(_), Some(_)) => AuthCheck::Invalid,
    }
}

/// Compare two secrets without short-circuiting on the first differing byte.
/// Only the length is allowed to leak.
fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && provided
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |diff, (p, e)| diff | (p ^ e))
            == 0
}
