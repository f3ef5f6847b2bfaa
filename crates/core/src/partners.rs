//! Partners and their webhook endpoints.

use serde::Serialize;
use url::Url;

use crate::credentials::{mask_secret, GeneratedCredentials, RotatedSecrets};
use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

/// Prefix of per-host circuit breaker names for outbound deliveries.
pub const WEBHOOK_BREAKER_PREFIX: &str = "webhook:";

// ---------------------------------------------------------------------------
// Partner
// ---------------------------------------------------------------------------

/// A registered API consumer.
///
/// Only the hash of the client secret is kept. The webhook secret is kept
/// in full because outbound deliveries are signed with it.
#[derive(Debug, Clone)]
pub struct Partner {
    pub id: EntityId,
    pub name: String,
    pub client_id: String,
    pub client_secret_hash: String,
    pub masked_client_secret: String,
    pub webhook_secret: String,
    pub scopes: Vec<String>,
    pub webhook_ids: Vec<EntityId>,
    pub created_at: Timestamp,
}

impl Partner {
    pub fn new(
        name: &str,
        scopes: Vec<String>,
        credentials: &GeneratedCredentials,
        now: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.trim().to_string(),
            client_id: credentials.client_id.clone(),
            client_secret_hash: credentials.client_secret_hash.clone(),
            masked_client_secret: mask_secret(&credentials.client_secret),
            webhook_secret: credentials.webhook_secret.clone(),
            scopes,
            webhook_ids: Vec::new(),
            created_at: now,
        }
    }

    /// Replace both secrets. Id, client id and scopes are unchanged.
    pub fn rotate(&mut self, secrets: &RotatedSecrets) {
        self.client_secret_hash = secrets.client_secret_hash.clone();
        self.masked_client_secret = mask_secret(&secrets.client_secret);
        self.webhook_secret = secrets.webhook_secret.clone();
    }

    pub fn summary(&self) -> PartnerSummary {
        PartnerSummary {
            id: self.id,
            name: self.name.clone(),
            client_id: self.client_id.clone(),
            masked_client_secret: self.masked_client_secret.clone(),
            masked_webhook_secret: mask_secret(&self.webhook_secret),
            scopes: self.scopes.clone(),
            webhook_count: self.webhook_ids.len(),
            created_at: self.created_at,
        }
    }
}

/// Masked partner view returned by every read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: EntityId,
    pub name: String,
    pub client_id: String,
    pub masked_client_secret: String,
    pub masked_webhook_secret: String,
    pub scopes: Vec<String>,
    pub webhook_count: usize,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Webhook endpoint
// ---------------------------------------------------------------------------

/// A partner-owned URL subscribed to a set of event types.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEndpoint {
    pub id: EntityId,
    pub partner_id: EntityId,
    pub url: String,
    pub event_types: Vec<String>,
    pub created_at: Timestamp,
}

impl WebhookEndpoint {
    /// Validate inputs and build a new endpoint.
    pub fn new(
        partner_id: EntityId,
        url: &str,
        event_types: Vec<String>,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            id: uuid::Uuid::new_v4(),
            partner_id,
            url: validate_webhook_url(url)?,
            event_types: validate_event_types(event_types)?,
            created_at: now,
        })
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|e| e == event_type)
    }

    /// Circuit breaker guarding deliveries to this endpoint's host.
    pub fn breaker_name(&self) -> String {
        breaker_name_for_url(&self.url)
    }
}

/// `webhook:<host>` for a delivery URL, falling back to the raw URL.
pub fn breaker_name_for_url(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());
    format!("{WEBHOOK_BREAKER_PREFIX}{host}")
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_webhook_url(raw: &str) -> Result<String, CoreError> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|e| CoreError::Validation(format!("url is not a valid URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::Validation("url must use http or https".into()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Validation("url must include a host".into()));
    }
    Ok(raw.to_string())
}

/// Trim and deduplicate event types; at least one is required.
pub fn validate_event_types(event_types: Vec<String>) -> Result<Vec<String>, CoreError> {
    let mut out: Vec<String> = Vec::new();
    for event_type in event_types {
        let event_type = event_type.trim();
        if !event_type.is_empty() && !out.iter().any(|e| e == event_type) {
            out.push(event_type.to_string());
        }
    }
    if out.is_empty() {
        return Err(CoreError::Validation(
            "eventTypes must contain at least one event type".into(),
        ));
    }
    Ok(out)
}
