//! Row model for the `inbound_events` table.

use std::collections::BTreeMap;

use aurum_core::inbound::InboundEventLog;
use aurum_core::types::{EntityId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `inbound_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct InboundEventRow {
    pub id: EntityId,
    pub provider: String,
    pub event_id: String,
    pub event_type: Option<String>,
    pub received_at: Timestamp,
    pub verified: bool,
    pub signature: Option<String>,
    pub signature_timestamp: Option<i64>,
    pub correlation_id: Option<String>,
    pub headers: Json<BTreeMap<String, String>>,
    pub body: String,
    pub expires_at: Timestamp,
}

impl From<InboundEventRow> for InboundEventLog {
    fn from(row: InboundEventRow) -> Self {
        Self {
            id: row.id,
            provider: row.provider,
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: row.received_at,
            verified: row.verified,
            signature: row.signature,
            signature_timestamp: row.signature_timestamp,
            correlation_id: row.correlation_id,
            headers: row.headers.0,
            body: row.body,
            expires_at: row.expires_at,
        }
    }
}
