//! Integration tests for the inbound event repository.
//!
//! Runs against a real database:
//! - Insert with `(provider, event_id)` deduplication
//! - Listing order, provider filter and paging
//! - Expiry handling in reads and `delete_expired`
//! - KPI sample loading

use std::collections::BTreeMap;

use aurum_core::inbound::InboundEventLog;
use aurum_core::types::Timestamp;
use aurum_db::repositories::{InboundEventRepo, InsertOutcome};
use chrono::{Duration, SubsecRound, Utc};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now() -> Timestamp {
    Utc::now().trunc_subsecs(0)
}

fn new_event(provider: &str, event_id: &str, received_at: Timestamp) -> InboundEventLog {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());

    InboundEventLog {
        id: uuid::Uuid::new_v4(),
        provider: provider.to_string(),
        event_id: event_id.to_string(),
        event_type: Some("signing.completed".to_string()),
        received_at,
        verified: false,
        signature: None,
        signature_timestamp: None,
        correlation_id: None,
        headers,
        body: format!(r#"{{"id":"{event_id}"}}"#),
        expires_at: received_at + Duration::days(30),
    }
}

// ---------------------------------------------------------------------------
// Test: insert and deduplication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_then_duplicate_event_id(pool: PgPool) {
    let t = now();
    let first = new_event("clicksign", "sig-1", t);
    let outcome = InboundEventRepo::insert(&pool, &first).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Stored);

    // Same (provider, event_id) under a fresh row id.
    let replay = new_event("clicksign", "sig-1", t + Duration::seconds(5));
    let outcome = InboundEventRepo::insert(&pool, &replay).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Duplicate);

    let count = InboundEventRepo::count(&pool, None, t).await.unwrap();
    assert_eq!(count, 1);

    let rows = InboundEventRepo::list(&pool, None, 10, 0, t).await.unwrap();
    assert_eq!(rows[0].id, first.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_same_event_id_for_other_provider_is_stored(pool: PgPool) {
    let t = now();
    InboundEventRepo::insert(&pool, &new_event("acme", "evt-1", t))
        .await
        .unwrap();
    let outcome = InboundEventRepo::insert(&pool, &new_event("globex", "evt-1", t))
        .await
        .unwrap();

    assert_eq!(outcome, InsertOutcome::Stored);
    assert_eq!(InboundEventRepo::count(&pool, None, t).await.unwrap(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_round_trips_fields(pool: PgPool) {
    let t = now();
    let mut event = new_event("acme", "evt-7", t);
    event.verified = true;
    event.signature = Some("t=1,v1=ab".to_string());
    event.signature_timestamp = Some(1);
    event.correlation_id = Some("corr-7".to_string());
    InboundEventRepo::insert(&pool, &event).await.unwrap();

    let rows = InboundEventRepo::list(&pool, Some("acme"), 10, 0, t).await.unwrap();
    let stored = &rows[0];
    assert_eq!(stored.event_id, "evt-7");
    assert!(stored.verified);
    assert_eq!(stored.signature.as_deref(), Some("t=1,v1=ab"));
    assert_eq!(stored.signature_timestamp, Some(1));
    assert_eq!(stored.correlation_id.as_deref(), Some("corr-7"));
    assert_eq!(stored.headers["content-type"], "application/json");
    assert_eq!(stored.received_at, t);
}

// ---------------------------------------------------------------------------
// Test: listing and counting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_list_newest_first_with_filter_and_paging(pool: PgPool) {
    let t = now();
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let event = new_event("acme", id, t + Duration::seconds(i as i64));
        InboundEventRepo::insert(&pool, &event).await.unwrap();
    }
    InboundEventRepo::insert(&pool, &new_event("globex", "z", t))
        .await
        .unwrap();

    let page = InboundEventRepo::list(&pool, Some("acme"), 2, 0, t).await.unwrap();
    let ids: Vec<_> = page.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);

    let next = InboundEventRepo::list(&pool, Some("acme"), 2, 2, t).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].event_id, "a");

    assert_eq!(InboundEventRepo::count(&pool, Some("acme"), t).await.unwrap(), 3);
    assert_eq!(InboundEventRepo::count(&pool, Some("globex"), t).await.unwrap(), 1);
    assert_eq!(InboundEventRepo::count(&pool, None, t).await.unwrap(), 4);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_expired_rows_are_hidden_and_deleted(pool: PgPool) {
    let t = now();
    let mut stale = new_event("acme", "old", t - Duration::days(2));
    stale.expires_at = t - Duration::days(1);
    InboundEventRepo::insert(&pool, &stale).await.unwrap();
    InboundEventRepo::insert(&pool, &new_event("acme", "fresh", t))
        .await
        .unwrap();

    let rows = InboundEventRepo::list(&pool, None, 10, 0, t).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_id, "fresh");
    assert_eq!(InboundEventRepo::count(&pool, None, t).await.unwrap(), 1);

    let removed = InboundEventRepo::delete_expired(&pool, t).await.unwrap();
    assert_eq!(removed, 1);
    let removed = InboundEventRepo::delete_expired(&pool, t).await.unwrap();
    assert_eq!(removed, 0);

    // The expired event id is free again once its row is gone.
    let outcome = InboundEventRepo::insert(&pool, &new_event("acme", "old", t))
        .await
        .unwrap();
    assert_eq!(outcome, InsertOutcome::Stored);
}

// ---------------------------------------------------------------------------
// Test: KPI samples
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_kpi_samples_oldest_first_and_filtered(pool: PgPool) {
    let t = now();
    let mut verified = new_event("acme", "a-2", t);
    verified.verified = true;
    InboundEventRepo::insert(&pool, &verified).await.unwrap();
    InboundEventRepo::insert(&pool, &new_event("acme", "a-1", t - Duration::minutes(3)))
        .await
        .unwrap();
    InboundEventRepo::insert(&pool, &new_event("globex", "g-1", t))
        .await
        .unwrap();
    let mut stale = new_event("acme", "a-0", t - Duration::days(2));
    stale.expires_at = t - Duration::days(1);
    InboundEventRepo::insert(&pool, &stale).await.unwrap();

    let samples = InboundEventRepo::kpi_samples(&pool, Some("acme"), t).await.unwrap();
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.provider == "acme"));
    assert_eq!(samples[0].received_at, t - Duration::minutes(3));
    assert!(!samples[0].verified);
    assert!(samples[1].verified);

    let all = InboundEventRepo::kpi_samples(&pool, None, t).await.unwrap();
    assert_eq!(all.len(), 3);
}
