//! HTTP transport for signed webhook deliveries.
//!
//! [`WebhookTransport`] is the seam between the delivery engine and the
//! network; [`HttpTransport`] is the `reqwest` implementation. Non-2xx
//! responses are reported as [`WebhookError::HttpStatus`] so the circuit
//! breaker counts them as failures.

use std::time::Duration;

use async_trait::async_trait;

/// Default per-attempt timeout.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(8);

/// Header naming the event type on outbound deliveries.
pub const EVENT_HEADER: &str = "x-aurum-event";

/// Header carrying the delivery log id on outbound deliveries.
pub const DELIVERY_HEADER: &str = "x-aurum-delivery";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The HTTP request failed (connect, DNS, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The attempt exceeded the delivery timeout.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: String },

    /// The endpoint host's circuit breaker is open.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A fully prepared outbound request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// A 2xx response from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `request`. Returns `Err(HttpStatus)` for non-2xx responses.
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, WebhookError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aurum-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, WebhookError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let success = response.status().is_success();
        let body = response.text().await.unwrap_or_default();

        if success {
            Ok(WebhookResponse { status, body })
        } else {
            Err(WebhookError::HttpStatus { status, body })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
