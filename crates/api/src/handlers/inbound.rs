//! Handlers for the inbound provider webhook surface.
//!
//! Providers post to `/webhooks/{provider}` without a bearer token and
//! always get 202 or 400 back. The log and KPI reads are operator-only and
//! answer with bare JSON objects.

use aurum_core::inbound::{normalize_provider, InboundEventLog};
use aurum_core::kpi::{compute_kpis, compute_stats, KpiSnapshot, KpiWindow, StatsSnapshot};
use aurum_core::pagination::{
    clamp_limit, clamp_offset, DEFAULT_INBOUND_LOG_LIMIT, MAX_INBOUND_LOG_LIMIT,
};
use aurum_core::types::EntityId;
use aurum_events::{IngestResult, Recorded};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireOperator;
use crate::query::{InboundLogParams, KpiParams};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub status: &'static str,
    pub id: EntityId,
    pub verified: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct InboundLogResponse {
    pub items: Vec<InboundEventLog>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

/// POST /api/v1/webhooks/{provider}
///
/// Accept a provider callback. A bad or missing signature is recorded as
/// `verified: false` rather than rejected; only a contract violation or a
/// non-JSON body yields 400.
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<IngestAccepted>)> {
    let headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    match state
        .inbound
        .ingest(&provider, &headers, &body, Utc::now())
        .await?
    {
        IngestResult::Accepted {
            id,
            verified,
            recorded,
        } => Ok((
            StatusCode::ACCEPTED,
            Json(IngestAccepted {
                status: "accepted",
                id,
                verified,
                duplicate: recorded == Recorded::Duplicate,
            }),
        )),
        IngestResult::Rejected(details) => Err(AppError::InvalidPayload(details)),
    }
}

/// GET /api/v1/webhooks/logs
///
/// Unexpired inbound events, newest first.
pub async fn list_logs(
    State(state): State<AppState>,
    RequireOperator(_operator): RequireOperator,
    Query(params): Query<InboundLogParams>,
) -> AppResult<Json<InboundLogResponse>> {
    let provider = provider_filter(params.provider.as_deref())?;
    let limit = clamp_limit(params.limit, DEFAULT_INBOUND_LOG_LIMIT, MAX_INBOUND_LOG_LIMIT);
    let offset = clamp_offset(params.offset);

    let page = state
        .inbound
        .list(provider.as_deref(), limit, offset, Utc::now())
        .await;

    Ok(Json(InboundLogResponse {
        items: page.items,
        total: page.total,
        limit,
        offset,
    }))
}

/// GET /api/v1/webhooks/stats
///
/// Verification counters for one window (`5m`, `1h`, `24h` or `all`,
/// default `24h`).
pub async fn stats(
    State(state): State<AppState>,
    RequireOperator(_operator): RequireOperator,
    Query(params): Query<KpiParams>,
) -> AppResult<Json<StatsSnapshot>> {
    let provider = provider_filter(params.provider.as_deref())?;
    let window = params
        .window
        .as_deref()
        .map(KpiWindow::parse)
        .transpose()?
        .unwrap_or_default();

    let now = Utc::now();
    let samples = state.inbound.kpi_samples(provider.as_deref(), now).await;
    Ok(Json(compute_stats(&samples, provider.as_deref(), window, now)))
}

/// GET /api/v1/webhooks/kpis
///
/// Counters and request rates for every window at once.
pub async fn kpis(
    State(state): State<AppState>,
    RequireOperator(_operator): RequireOperator,
    Query(params): Query<KpiParams>,
) -> AppResult<Json<KpiSnapshot>> {
    let provider = provider_filter(params.provider.as_deref())?;
    let now = Utc::now();
    let samples = state.inbound.kpi_samples(provider.as_deref(), now).await;
    Ok(Json(compute_kpis(&samples, provider.as_deref(), now)))
}

fn provider_filter(raw: Option<&str>) -> Result<Option<String>, AppError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => Ok(Some(normalize_provider(p)?)),
        None => Ok(None),
    }
}
