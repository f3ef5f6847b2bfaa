//! Repository for the `inbound_events` table.

use aurum_core::inbound::InboundEventLog;
use aurum_core::kpi::KpiSample;
use aurum_core::types::Timestamp;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::inbound_event::InboundEventRow;

const COLUMNS: &str = "\
    id, provider, event_id, event_type, received_at, verified, signature, \
    signature_timestamp, correlation_id, headers, body, expires_at";

/// Result of inserting an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    /// A row with the same `(provider, event_id)` already exists.
    Duplicate,
}

/// Persistence operations for inbound webhook events.
pub struct InboundEventRepo;

impl InboundEventRepo {
    /// Delete every row whose `expires_at` is at or before `now`.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inbound_events WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Insert an event, reporting a duplicate `(provider, event_id)` instead
    /// of failing.
    pub async fn insert(
        pool: &PgPool,
        event: &InboundEventLog,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let query = format!(
            "INSERT INTO inbound_events ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (provider, event_id) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(event.id)
            .bind(&event.provider)
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(event.received_at)
            .bind(event.verified)
            .bind(&event.signature)
            .bind(event.signature_timestamp)
            .bind(&event.correlation_id)
            .bind(Json(&event.headers))
            .bind(&event.body)
            .bind(event.expires_at)
            .execute(pool)
            .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Stored
        })
    }

    /// List unexpired events, newest first.
    pub async fn list(
        pool: &PgPool,
        provider: Option<&str>,
        limit: i64,
        offset: i64,
        now: Timestamp,
    ) -> Result<Vec<InboundEventLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM inbound_events \
             WHERE expires_at > $1 AND ($2::TEXT IS NULL OR provider = $2) \
             ORDER BY received_at DESC \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, InboundEventRow>(&query)
            .bind(now)
            .bind(provider)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(InboundEventLog::from).collect())
    }

    /// KPI fields of every unexpired event, optionally for one provider.
    pub async fn kpi_samples(
        pool: &PgPool,
        provider: Option<&str>,
        now: Timestamp,
    ) -> Result<Vec<KpiSample>, sqlx::Error> {
        let rows: Vec<(String, bool, Timestamp, Timestamp)> = sqlx::query_as(
            "SELECT provider, verified, received_at, expires_at FROM inbound_events \
             WHERE expires_at > $1 AND ($2::TEXT IS NULL OR provider = $2) \
             ORDER BY received_at ASC",
        )
        .bind(now)
        .bind(provider)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(provider, verified, received_at, expires_at)| KpiSample {
                provider,
                verified,
                received_at,
                expires_at,
            })
            .collect())
    }

    /// Count unexpired events, optionally for one provider.
    pub async fn count(
        pool: &PgPool,
        provider: Option<&str>,
        now: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM inbound_events \
             WHERE expires_at > $1 AND ($2::TEXT IS NULL OR provider = $2)",
        )
        .bind(now)
        .bind(provider)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
