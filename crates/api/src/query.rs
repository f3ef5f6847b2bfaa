//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `GET /partners/{id}/logs` filters.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryLogParams {
    pub status: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

/// `GET /webhooks/logs` filters.
#[derive(Debug, Deserialize)]
pub struct InboundLogParams {
    pub provider: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /webhooks/stats` and `GET /webhooks/kpis` filters.
#[derive(Debug, Deserialize)]
pub struct KpiParams {
    pub provider: Option<String>,
    pub window: Option<String>,
}

/// `POST /partners/{id}/test-event` flags.
#[derive(Debug, Default, Deserialize)]
pub struct TestEventParams {
    #[serde(default)]
    pub confirm: bool,
}
