//! Request idempotency records and their store.
//!
//! A caller-supplied `Idempotency-Key` scopes a cached response to
//! `(method, route, key)`. Each record moves through three states:
//!
//! 1. **reserved**: the first request holds the key while its handler runs.
//!    Concurrent requests with the same key observe the reservation instead
//!    of running the handler a second time.
//! 2. **completed**: the handler produced a 2xx response, which is cached
//!    and replayed verbatim until the TTL elapses.
//! 3. **expired**: past its TTL the record is ignored and may be purged.
//!
//! Non-2xx outcomes release the reservation so the caller can retry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::hashing::sha256_hex;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Request header carrying the caller's key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header marking a replayed response.
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Default lifetime of a record.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// A reservation older than this is considered abandoned.
pub const RESERVATION_TIMEOUT_SECS: i64 = 60;

/// Maximum accepted key length.
pub const MAX_KEY_LENGTH: usize = 255;

/// Response headers stored alongside a cached response and replayed.
pub const REPLAYED_HEADER_ALLOWLIST: &[&str] =
    &["content-type", "location", "x-total-count", "x-limit", "x-offset"];

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Validate a caller-supplied key: 1-255 visible ASCII characters.
pub fn validate_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(CoreError::Validation(format!(
            "Idempotency-Key must be between 1 and {MAX_KEY_LENGTH} characters"
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(CoreError::Validation(
            "Idempotency-Key must contain only visible ASCII characters".into(),
        ));
    }
    Ok(())
}

/// Derive the store key from the request identity.
///
/// `subject` namespaces keys per authenticated caller so two partners
/// choosing the same key never see each other's responses.
pub fn lookup_key(method: &str, route: &str, key: &str, subject: Option<&str>) -> String {
    let scope = subject.unwrap_or("anonymous");
    sha256_hex(format!("{scope} {} {route} {key}", method.to_ascii_uppercase()).as_bytes())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A cached HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    /// Allowlisted headers, lower-case names.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum IdempotencyRecord {
    Reserved {
        reserved_at: Timestamp,
        expires_at: Timestamp,
    },
    Completed {
        response: CachedResponse,
        expires_at: Timestamp,
    },
}

impl IdempotencyRecord {
    fn expires_at(&self) -> Timestamp {
        match self {
            Self::Reserved { expires_at, .. } | Self::Completed { expires_at, .. } => *expires_at,
        }
    }

    fn is_live(&self, now: Timestamp) -> bool {
        match self {
            Self::Reserved { reserved_at, .. } => {
                now < self.expires_at()
                    && now < *reserved_at + Duration::seconds(RESERVATION_TIMEOUT_SECS)
            }
            Self::Completed { .. } => now < self.expires_at(),
        }
    }
}

/// Result of trying to reserve a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The caller holds the key and must run the handler.
    Reserved,
    /// Another request holds a live reservation for this key.
    InFlight,
    /// A completed response exists; replay it.
    Replay(CachedResponse),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Keyed store of idempotency records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically inspect `key` and reserve it if free.
    async fn reserve(
        &self,
        key: &str,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<ReserveOutcome, CoreError>;

    /// Cache a successful response under a reserved key.
    async fn complete(
        &self,
        key: &str,
        response: CachedResponse,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<(), CoreError>;

    /// Drop a reservation without caching anything.
    async fn release(&self, key: &str) -> Result<(), CoreError>;

    /// Remove expired records, returning how many were dropped.
    async fn purge_expired(&self, now: Timestamp) -> Result<usize, CoreError>;
}

/// Process-local store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(
        &self,
        key: &str,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<ReserveOutcome, CoreError> {
        let mut records = self.records.lock().await;

        if let Some(existing) = records.get(key).filter(|r| r.is_live(now)) {
            return Ok(match existing {
                IdempotencyRecord::Completed { response, .. } => {
                    ReserveOutcome::Replay(response.clone())
                }
                IdempotencyRecord::Reserved { .. } => ReserveOutcome::InFlight,
            });
        }

        records.insert(
            key.to_string(),
            IdempotencyRecord::Reserved {
                reserved_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(ReserveOutcome::Reserved)
    }

    async fn complete(
        &self,
        key: &str,
        response: CachedResponse,
        now: Timestamp,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        self.records.lock().await.insert(
            key.to_string(),
            IdempotencyRecord::Completed {
                response,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), CoreError> {
        let mut records = self.records.lock().await;
        if matches!(records.get(key), Some(IdempotencyRecord::Reserved { .. })) {
            records.remove(key);
        }
        Ok(())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize, CoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| now < record.expires_at());
        Ok(before - records.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
