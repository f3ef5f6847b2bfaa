//! Outbound delivery log model, attempt outcomes and log queries.
//!
//! A [`DeliveryLog`] is created once per `(event, endpoint)` dispatch and is
//! mutated in place by every send attempt, including replays. Attempt
//! numbers are reserved before the send starts; an outcome is only applied
//! if it belongs to the newest reserved attempt, so concurrent replays of
//! the same log resolve to the most recent attempt.

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::pagination::{
    clamp_limit, clamp_offset, page, DEFAULT_DELIVERY_LOG_LIMIT, MAX_DELIVERY_LOG_LIMIT,
};
use crate::types::{EntityId, Timestamp};

/// Maximum stored length of an endpoint response body, in bytes.
pub const MAX_RESPONSE_BODY_BYTES: usize = 2048;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "queued" => Ok(Self::Queued),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "invalid status '{other}', expected one of queued, delivered, failed"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Log record
// ---------------------------------------------------------------------------

/// The record of one or more attempts to deliver an event to an endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLog {
    pub id: EntityId,
    pub partner_id: EntityId,
    pub webhook_id: EntityId,
    pub webhook_url: String,
    pub event_type: String,
    /// The `data` part of the envelope, as dispatched.
    pub payload: Value,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    /// Time of the most recent attempt (creation time before the first one).
    pub timestamp: Timestamp,
}

impl DeliveryLog {
    pub fn new(
        partner_id: EntityId,
        webhook_id: EntityId,
        webhook_url: &str,
        event_type: &str,
        payload: Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            partner_id,
            webhook_id,
            webhook_url: webhook_url.to_string(),
            event_type: event_type.to_string(),
            payload,
            status: DeliveryStatus::Queued,
            attempt: 0,
            response_status: None,
            response_body: None,
            last_error: None,
            created_at: now,
            timestamp: now,
        }
    }

    /// Reserve the next attempt number and stamp the attempt time.
    pub fn begin_attempt(&mut self, now: Timestamp) -> u32 {
        self.attempt += 1;
        self.timestamp = now;
        self.attempt
    }

    /// Apply the outcome of `attempt`. Returns `false` (and changes nothing)
    /// when a newer attempt has been reserved since.
    pub fn apply_outcome(&mut self, attempt: u32, outcome: &AttemptOutcome) -> bool {
        if attempt != self.attempt {
            return false;
        }
        match outcome {
            AttemptOutcome::Delivered { status, body } => {
                self.status = DeliveryStatus::Delivered;
                self.response_status = Some(*status);
                self.response_body = Some(truncate_body(body));
                self.last_error = None;
            }
            AttemptOutcome::Failed { status, body, error } => {
                self.status = DeliveryStatus::Failed;
                self.response_status = *status;
                self.response_body = body.as_deref().map(truncate_body);
                self.last_error = Some(error.clone());
            }
        }
        true
    }

    /// The signed envelope sent on the wire for this delivery.
    pub fn envelope(&self) -> Value {
        build_envelope(&self.event_type, &self.payload, self.id, self.created_at)
    }
}

/// Result of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered {
        status: u16,
        body: String,
    },
    Failed {
        status: Option<u16>,
        body: Option<String>,
        error: String,
    },
}

/// Build the outbound envelope `{event, data, id, createdAt}`.
pub fn build_envelope(
    event_type: &str,
    data: &Value,
    id: EntityId,
    created_at: Timestamp,
) -> Value {
    json!({
        "event": event_type,
        "data": data,
        "id": id,
        "createdAt": created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// Truncate a response body to [`MAX_RESPONSE_BODY_BYTES`] on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_RESPONSE_BODY_BYTES {
        return body.to_string();
    }
    let mut end = MAX_RESPONSE_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(CoreError::Validation(format!(
                "invalid sort '{other}', expected asc or desc"
            ))),
        }
    }
}

/// Filters and paging for a partner's delivery logs.
#[derive(Debug, Clone)]
pub struct DeliveryLogQuery {
    pub status: Option<DeliveryStatus>,
    pub q: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: i64,
    pub offset: i64,
    pub sort: SortOrder,
}

impl Default for DeliveryLogQuery {
    fn default() -> Self {
        Self {
            status: None,
            q: None,
            from: None,
            to: None,
            limit: DEFAULT_DELIVERY_LOG_LIMIT,
            offset: 0,
            sort: SortOrder::Desc,
        }
    }
}

/// One page of filtered logs plus the filtered total.
#[derive(Debug, Clone)]
pub struct DeliveryLogPage {
    pub items: Vec<DeliveryLog>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

impl DeliveryLogQuery {
    fn matches(&self, log: &DeliveryLog, needle: Option<&str>) -> bool {
        if self.status.is_some_and(|s| s != log.status) {
            return false;
        }
        if self.from.is_some_and(|from| log.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| log.timestamp > to) {
            return false;
        }
        match needle {
            None => true,
            Some(needle) => {
                log.event_type.to_lowercase().contains(needle)
                    || log.webhook_url.to_lowercase().contains(needle)
                    || log.id.to_string().contains(needle)
                    || log
                        .last_error
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(needle))
            }
        }
    }

    /// Filter, sort by last-attempt time (ties broken by id) and page `logs`.
    pub fn apply(&self, logs: Vec<DeliveryLog>) -> DeliveryLogPage {
        let needle = self
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<DeliveryLog> = logs
            .into_iter()
            .filter(|log| self.matches(log, needle.as_deref()))
            .collect();

        matched.sort_by(|a, b| {
            let ordering = a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id));
            match self.sort {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let limit = clamp_limit(
            Some(self.limit),
            DEFAULT_DELIVERY_LOG_LIMIT,
            MAX_DELIVERY_LOG_LIMIT,
        );
        let offset = clamp_offset(Some(self.offset));
        let total = matched.len();
        let items = page(&matched, limit, offset);

        DeliveryLogPage {
            items,
            total,
            limit,
            offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 20, 8, 0, 0).unwrap()
    }

    fn log(event_type: &str, minutes: i64) -> DeliveryLog {
        DeliveryLog::new(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            "https://hooks.example.com/aurum",
            event_type,
            json!({"id": 1}),
            t0() + Duration::minutes(minutes),
        )
    }

    fn failed(error: &str) -> AttemptOutcome {
        AttemptOutcome::Failed {
            status: Some(500),
            body: Some("boom".into()),
            error: error.into(),
        }
    }

    #[test]
    fn new_log_is_queued_with_zero_attempts() {
        let log = log("person.created", 0);
        assert_eq!(log.status, DeliveryStatus::Queued);
        assert_eq!(log.attempt, 0);
    }

    #[test]
    fn outcome_of_current_attempt_is_applied() {
        let mut log = log("person.created", 0);
        let attempt = log.begin_attempt(t0());
        assert!(log.apply_outcome(attempt, &failed("HTTP 500")));
        assert_eq!(log.status, DeliveryStatus::Failed);
        assert_eq!(log.last_error.as_deref(), Some("HTTP 500"));

        let attempt = log.begin_attempt(t0());
        let ok = AttemptOutcome::Delivered { status: 204, body: String::new() };
        assert!(log.apply_outcome(attempt, &ok));
        assert_eq!(log.status, DeliveryStatus::Delivered);
        assert_eq!(log.attempt, 2);
        assert_eq!(log.last_error, None);
    }

    #[test]
    fn stale_outcome_is_discarded() {
        let mut log = log("person.created", 0);
        let first = log.begin_attempt(t0());
        let second = log.begin_attempt(t0());

        let ok = AttemptOutcome::Delivered { status: 200, body: "ok".into() };
        assert!(log.apply_outcome(second, &ok));
        assert!(!log.apply_outcome(first, &failed("timeout")));
        assert_eq!(log.status, DeliveryStatus::Delivered);
        assert_eq!(log.attempt, 2);
    }

    #[test]
    fn envelope_has_expected_fields() {
        let log = log("person.created", 0);
        let env = log.envelope();
        assert_eq!(env["event"], "person.created");
        assert_eq!(env["data"], json!({"id": 1}));
        assert_eq!(env["id"], log.id.to_string());
        assert_eq!(env["createdAt"], "2026-01-20T08:00:00.000Z");
    }

    #[test]
    fn response_body_is_truncated() {
        let long = "é".repeat(MAX_RESPONSE_BODY_BYTES);
        let truncated = truncate_body(&long);
        assert!(truncated.len() <= MAX_RESPONSE_BODY_BYTES);
        assert!(truncated.len() >= MAX_RESPONSE_BODY_BYTES - 1);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn query_filters_by_status_and_text() {
        let mut a = log("person.created", 0);
        let attempt = a.begin_attempt(t0());
        a.apply_outcome(attempt, &failed("HTTP 503"));
        let b = log("payroll.closed", 1);

        let query = DeliveryLogQuery {
            status: Some(DeliveryStatus::Failed),
            ..Default::default()
        };
        assert_eq!(query.apply(vec![a.clone(), b.clone()]).total, 1);

        let query = DeliveryLogQuery {
            q: Some("PAYROLL".into()),
            ..Default::default()
        };
        let page = query.apply(vec![a.clone(), b.clone()]);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, b.id);

        let query = DeliveryLogQuery {
            q: Some("503".into()),
            ..Default::default()
        };
        assert_eq!(query.apply(vec![a, b]).items.len(), 1);
    }

    #[test]
    fn query_sorts_and_pages() {
        let logs: Vec<_> = (0..5).map(|m| log("e", m)).collect();

        let page = DeliveryLogQuery {
            limit: 2,
            offset: 1,
            ..Default::default()
        }
        .apply(logs.clone());
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, logs[3].id);

        let page = DeliveryLogQuery {
            sort: SortOrder::Asc,
            from: Some(t0() + Duration::minutes(1)),
            to: Some(t0() + Duration::minutes(3)),
            ..Default::default()
        }
        .apply(logs.clone());
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].id, logs[1].id);
    }

    #[test]
    fn equal_timestamps_page_in_stable_id_order() {
        let logs: Vec<_> = (0..6).map(|_| log("e", 0)).collect();
        let mut ids: Vec<_> = logs.iter().map(|l| l.id).collect();
        ids.sort();

        for (sort, expected) in [
            (SortOrder::Asc, ids.clone()),
            (SortOrder::Desc, ids.iter().rev().copied().collect()),
        ] {
            let mut shuffled = logs.clone();
            shuffled.reverse();
            let paged: Vec<_> = [0, 3]
                .into_iter()
                .flat_map(|offset| {
                    DeliveryLogQuery {
                        sort,
                        limit: 3,
                        offset,
                        ..Default::default()
                    }
                    .apply(shuffled.clone())
                    .items
                })
                .map(|l| l.id)
                .collect();
            assert_eq!(paged, expected);
        }
    }

    #[test]
    fn status_and_sort_parsing() {
        assert_eq!(DeliveryStatus::parse("failed").unwrap(), DeliveryStatus::Failed);
        assert!(DeliveryStatus::parse("pending").is_err());
        assert_eq!(SortOrder::parse("ASC").unwrap(), SortOrder::Asc);
        assert!(SortOrder::parse("up").is_err());
    }
}
