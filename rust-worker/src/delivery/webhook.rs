//! HTTP webhook receiver for queued records.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, error};
use url::Url;

use super::Deliver;
use crate::error::DeliveryError;
use crate::queue::EmailRecord;

/// Client label sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Cloudflare-Email-Worker/1.0";

/// Posts each record as JSON to one preconfigured URL.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: Client,
    url: Url,
    user_agent: String,
}

impl WebhookSender {
    /// Create a sender whose requests give up after `timeout`.
    pub fn new(url: Url, user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            user_agent: user_agent.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn build_request(&self, email: &EmailRecord) -> reqwest::RequestBuilder {
        self.client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, self.user_agent.as_str())
            .json(email)
    }
}

#[async_trait]
impl Deliver for WebhookSender {
    async fn deliver(&self, email: &EmailRecord) -> Result<(), DeliveryError> {
        let response = match self.build_request(email).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(url = %self.url, to = %email.to, error = %e, "webhook_timeout");
                } else {
                    error!(url = %self.url, to = %email.to, error = %e, "webhook_request_error");
                }
                return Err(DeliveryError::Transport(e));
            }
        };

        let status = response.status();
        debug!(
            url = %self.url,
            to = %email.to,
            status_code = status.as_u16(),
            "webhook_response"
        );

        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> WebhookSender {
        WebhookSender::new(
            Url::parse("https://hooks.example.com/inbound").unwrap(),
            "TestAgent/1.0",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_request_headers_and_body() {
        let email = EmailRecord::new("a@example.com", "b@example.com", "Hi", "text", "<p>x</p>");
        let request = sender().build_request(&email).build().unwrap();

        assert_eq!(request.method(), &reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://hooks.example.com/inbound");
        assert_eq!(
            request.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            request.headers().get(header::USER_AGENT).unwrap(),
            "TestAgent/1.0"
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let parsed: EmailRecord = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed, email);
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        use axum::{http::StatusCode, routing::post, Router};
        use tokio::net::TcpListener;

        let app = Router::new().route("/hook", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = WebhookSender::new(
            Url::parse(&format!("http://{}/hook", addr)).unwrap(),
            DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        )
        .unwrap();
        let email = EmailRecord::new("a@example.com", "b@example.com", "Hi", "", "");

        let err = sender.deliver(&email).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_success_status_is_delivered() {
        use axum::{http::StatusCode, routing::post, Router};
        use tokio::net::TcpListener;

        let app = Router::new().route("/hook", post(|| async { StatusCode::OK }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = WebhookSender::new(
            Url::parse(&format!("http://{}/hook", addr)).unwrap(),
            DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        )
        .unwrap();
        let email = EmailRecord::new("a@example.com", "b@example.com", "Hi", "", "");

        assert!(sender.deliver(&email).await.is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_transport_failure() {
        // Take a free port, then close it so nothing is listening.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let sender = WebhookSender::new(
            Url::parse(&format!("http://{}/hook", addr)).unwrap(),
            DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        )
        .unwrap();
        let email = EmailRecord::new("a@example.com", "b@example.com", "Hi", "", "");

        let err = sender.deliver(&email).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(ref e) if e.is_connect()), "{:?}", err);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_hung_receiver_times_out() {
        use axum::{http::StatusCode, routing::post, Router};
        use tokio::net::TcpListener;

        let app = Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = WebhookSender::new(
            Url::parse(&format!("http://{}/hook", addr)).unwrap(),
            DEFAULT_USER_AGENT,
            Duration::from_millis(200),
        )
        .unwrap();
        let email = EmailRecord::new("a@example.com", "b@example.com", "Hi", "", "");

        let err = sender.deliver(&email).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(ref e) if e.is_timeout()), "{:?}", err);
    }
}
