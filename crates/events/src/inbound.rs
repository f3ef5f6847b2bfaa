//! Inbound webhook ingestion: contract check, signature verification, the
//! bounded in-memory ring and the optional durable log.
//!
//! Events are deduplicated on `(provider, event_id)` before they are
//! logged: by the unique constraint when a database pool is configured,
//! by the ring otherwise. Listings and KPIs read the same source, the
//! database when present and the ring in memory-only mode. Persistence
//! failures never fail ingestion; the event falls back to the ring and
//! the provider still gets 202.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use aurum_core::contracts::{validate_payload, FieldViolation};
use aurum_core::error::CoreError;
use aurum_core::inbound::{
    derive_event_id, normalize_provider, sanitize_headers, secret_env_var, InboundEventLog,
    CORRELATION_HEADERS, DEFAULT_RETENTION_DAYS, DEFAULT_RING_CAPACITY,
};
use aurum_core::kpi::KpiSample;
use aurum_core::signing::{
    self, parse_signature_header, ALT_SIGNATURE_HEADER, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use aurum_core::types::{EntityId, Timestamp};
use aurum_db::repositories::{InboundEventRepo, InsertOutcome};
use aurum_db::DbPool;
use serde_json::Value;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Source of per-provider shared webhook secrets.
pub trait SecretSource: Send + Sync {
    fn secret_for(&self, provider: &str) -> Option<String>;
}

/// Reads `AURUM_INTEGRATIONS_<PROVIDER>_WEBHOOK_SECRET` on every lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn secret_for(&self, provider: &str) -> Option<String> {
        std::env::var(secret_env_var(provider))
            .ok()
            .filter(|s| !s.is_empty())
    }
}

/// Fixed provider → secret map.
#[derive(Debug, Default, Clone)]
pub struct StaticSecrets(HashMap<String, String>);

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: &str, secret: &str) -> Self {
        self.0.insert(provider.to_string(), secret.to_string());
        self
    }
}

impl SecretSource for StaticSecrets {
    fn secret_for(&self, provider: &str) -> Option<String> {
        self.0.get(provider).cloned()
    }
}

// ---------------------------------------------------------------------------
// Config and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InboundConfig {
    pub retention: chrono::Duration,
    pub ring_capacity: usize,
    pub tolerance_secs: u64,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
            ring_capacity: DEFAULT_RING_CAPACITY,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

/// Where an accepted event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Logged as a new event.
    Stored,
    /// This `(provider, event_id)` was already logged; nothing was added.
    Duplicate,
    /// The durable write failed; the event is held in the ring only.
    MemoryOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    Accepted {
        id: EntityId,
        verified: bool,
        recorded: Recorded,
    },
    /// The payload failed its contract; nothing was logged.
    Rejected(Vec<FieldViolation>),
}

/// One page of the inbound log.
#[derive(Debug, Clone)]
pub struct InboundPage {
    pub items: Vec<InboundEventLog>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct InboundLog {
    ring: RwLock<VecDeque<InboundEventLog>>,
    pool: Option<DbPool>,
    secrets: Arc<dyn SecretSource>,
    config: InboundConfig,
}

impl InboundLog {
    pub fn new(
        pool: Option<DbPool>,
        secrets: Arc<dyn SecretSource>,
        config: InboundConfig,
    ) -> Self {
        Self {
            ring: RwLock::new(VecDeque::new()),
            pool,
            secrets,
            config,
        }
    }

    pub fn has_database(&self) -> bool {
        self.pool.is_some()
    }

    /// Validate, verify and record one provider callback.
    ///
    /// `Err` is returned only for an invalid provider name.
    pub async fn ingest(
        &self,
        provider_raw: &str,
        headers: &[(String, String)],
        body: &[u8],
        now: Timestamp,
    ) -> Result<IngestResult, CoreError> {
        let provider = normalize_provider(provider_raw)?;

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::info!(provider = %provider, error = %e, "Inbound webhook body is not JSON");
                return Ok(IngestResult::Rejected(vec![FieldViolation {
                    field: "body".to_string(),
                    rule_type: "json".to_string(),
                    message: "body must be valid JSON".to_string(),
                }]));
            }
        };

        let violations = validate_payload(&provider, &payload);
        if !violations.is_empty() {
            tracing::info!(
                provider = %provider,
                violations = violations.len(),
                "Inbound webhook rejected by contract"
            );
            return Ok(IngestResult::Rejected(violations));
        }

        let header = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        let signature = header(SIGNATURE_HEADER).or_else(|| header(ALT_SIGNATURE_HEADER));
        let correlation_id = CORRELATION_HEADERS.iter().copied().find_map(|name| header(name));

        let verified = match (&signature, self.secrets.secret_for(&provider)) {
            (Some(sig), Some(secret)) => {
                signing::verify_at(body, sig, &secret, self.config.tolerance_secs, now.timestamp())
            }
            _ => false,
        };

        let event = InboundEventLog {
            id: uuid::Uuid::new_v4(),
            event_id: derive_event_id(&payload, body),
            event_type: payload.get("type").and_then(Value::as_str).map(str::to_string),
            received_at: now,
            verified,
            signature_timestamp: signature
                .as_deref()
                .and_then(parse_signature_header)
                .map(|parsed| parsed.timestamp),
            signature,
            correlation_id,
            headers: sanitize_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            body: String::from_utf8_lossy(body).into_owned(),
            expires_at: now + self.config.retention,
            provider,
        };

        let recorded = self.record(&event, now).await;
        if recorded == Recorded::Duplicate {
            tracing::warn!(
                provider = %event.provider,
                event_id = %event.event_id,
                "Duplicate inbound event not stored"
            );
        }

        tracing::info!(
            provider = %event.provider,
            event_id = %event.event_id,
            verified,
            recorded = ?recorded,
            "Inbound webhook accepted"
        );

        Ok(IngestResult::Accepted {
            id: event.id,
            verified,
            recorded,
        })
    }

    async fn record(&self, event: &InboundEventLog, now: Timestamp) -> Recorded {
        let Some(pool) = &self.pool else {
            return self.push_ring(event, now, true).await;
        };

        if let Err(e) = InboundEventRepo::delete_expired(pool, now).await {
            tracing::error!(error = %e, "Failed to prune expired inbound events");
        }

        match InboundEventRepo::insert(pool, event).await {
            Ok(InsertOutcome::Stored) => self.push_ring(event, now, false).await,
            Ok(InsertOutcome::Duplicate) => Recorded::Duplicate,
            Err(e) => {
                tracing::error!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to persist inbound event, keeping it in memory only"
                );
                match self.push_ring(event, now, true).await {
                    Recorded::Duplicate => Recorded::Duplicate,
                    _ => Recorded::MemoryOnly,
                }
            }
        }
    }

    /// Append to the ring, evicting the oldest entries past capacity. With
    /// `dedupe`, an unexpired entry with the same `(provider, event_id)`
    /// turns the push into [`Recorded::Duplicate`].
    async fn push_ring(&self, event: &InboundEventLog, now: Timestamp, dedupe: bool) -> Recorded {
        let mut ring = self.ring.write().await;
        ring.retain(|e| !e.is_expired(now));
        if dedupe
            && ring
                .iter()
                .any(|e| e.provider == event.provider && e.event_id == event.event_id)
        {
            return Recorded::Duplicate;
        }
        ring.push_back(event.clone());
        while ring.len() > self.config.ring_capacity {
            ring.pop_front();
        }
        Recorded::Stored
    }

    /// Unexpired events, newest first.
    ///
    /// Reads durable storage when configured, falling back to the ring if
    /// the database query fails.
    pub async fn list(
        &self,
        provider: Option<&str>,
        limit: i64,
        offset: i64,
        now: Timestamp,
    ) -> InboundPage {
        if let Some(pool) = &self.pool {
            let rows = InboundEventRepo::list(pool, provider, limit, offset, now).await;
            let count = InboundEventRepo::count(pool, provider, now).await;
            match (rows, count) {
                (Ok(items), Ok(total)) => {
                    return InboundPage {
                        items,
                        total: usize::try_from(total).unwrap_or_default(),
                    };
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to list inbound events, using in-memory log");
                }
            }
        }

        let matching: Vec<InboundEventLog> = self
            .ring
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| !e.is_expired(now) && provider.map_or(true, |p| p == e.provider))
            .cloned()
            .collect();

        InboundPage {
            total: matching.len(),
            items: aurum_core::pagination::page(&matching, limit, offset),
        }
    }

    /// KPI inputs for every unexpired logged event, oldest first.
    ///
    /// Reads the same source as [`InboundLog::list`], so window totals agree
    /// with the listing even when the ring has evicted older events.
    pub async fn kpi_samples(&self, provider: Option<&str>, now: Timestamp) -> Vec<KpiSample> {
        if let Some(pool) = &self.pool {
            match InboundEventRepo::kpi_samples(pool, provider, now).await {
                Ok(samples) => return samples,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load inbound KPI samples, using in-memory log");
                }
            }
        }

        self.ring
            .read()
            .await
            .iter()
            .filter(|e| !e.is_expired(now) && provider.map_or(true, |p| p == e.provider))
            .map(KpiSample::from)
            .collect()
    }

    #[cfg(test)]
    async fn ring_entries(&self, now: Timestamp) -> Vec<InboundEventLog> {
        self.ring
            .read()
            .await
            .iter()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect()
    }

    /// Drop expired ring entries and durable rows. Returns how many ring
    /// entries and rows were removed.
    pub async fn prune(&self, now: Timestamp) -> (usize, u64) {
        let ring_removed = {
            let mut ring = self.ring.write().await;
            let before = ring.len();
            ring.retain(|e| !e.is_expired(now));
            before - ring.len()
        };

        let rows_removed = match &self.pool {
            Some(pool) => InboundEventRepo::delete_expired(pool, now)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Failed to prune expired inbound events");
                    0
                }),
            None => 0,
        };

        (ring_removed, rows_removed)
    }

    /// Seed the ring from durable storage after a restart.
    pub async fn hydrate(&self, now: Timestamp) -> Result<usize, CoreError> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };

        let capacity = i64::try_from(self.config.ring_capacity).unwrap_or(i64::MAX);
        let mut recent = InboundEventRepo::list(pool, None, capacity, 0, now)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to load inbound events: {e}")))?;
        recent.reverse();

        let loaded = recent.len();
        *self.ring.write().await = recent.into();
        Ok(loaded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
