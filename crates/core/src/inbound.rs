//! Inbound webhook event records and the pure helpers used to build them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::hashing::sha256_hex;
use crate::types::{EntityId, Timestamp};

/// Default inbound log retention.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Default bound of the in-memory inbound ring.
pub const DEFAULT_RING_CAPACITY: usize = 1000;

/// Header names never persisted with an inbound event.
pub const REDACTED_HEADERS: &[&str] = &["authorization", "cookie"];

/// Headers carrying a caller correlation id, in order of preference.
pub const CORRELATION_HEADERS: &[&str] = &["x-correlation-id", "x-request-id"];

static PROVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("valid regex"));

/// One accepted inbound webhook call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEventLog {
    /// Synthetic log id, distinct from `event_id`.
    pub id: EntityId,
    pub provider: String,
    /// Stable per-event id used for deduplication.
    pub event_id: String,
    pub event_type: Option<String>,
    pub received_at: Timestamp,
    pub verified: bool,
    pub signature: Option<String>,
    /// The `t=` claim of the signature header, if present and numeric.
    pub signature_timestamp: Option<i64>,
    pub correlation_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub expires_at: Timestamp,
}

impl InboundEventLog {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// Lower-case a provider path segment and check it is a safe identifier.
pub fn normalize_provider(raw: &str) -> Result<String, CoreError> {
    let provider = raw.trim().to_ascii_lowercase();
    if PROVIDER_RE.is_match(&provider) {
        Ok(provider)
    } else {
        Err(CoreError::Validation(format!("invalid provider name: {raw}")))
    }
}

/// Environment variable holding a provider's shared webhook secret.
///
/// `docu-sign` maps to `AURUM_INTEGRATIONS_DOCU_SIGN_WEBHOOK_SECRET`.
pub fn secret_env_var(provider: &str) -> String {
    let name: String = provider
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("AURUM_INTEGRATIONS_{name}_WEBHOOK_SECRET")
}

/// Derive the per-event dedup id: payload `id`, then `event_id`, then a
/// SHA-256 of the raw body.
pub fn derive_event_id(payload: &Value, raw_body: &[u8]) -> String {
    ["id", "event_id"]
        .iter()
        .filter_map(|field| match payload.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
        .unwrap_or_else(|| sha256_hex(raw_body))
}

/// Keep only headers safe to persist, with lower-case names.
pub fn sanitize_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .filter(|(name, _)| !REDACTED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| (name, value.to_string()))
        .collect()
}
