//! Handlers for the `/partners` control plane.
//!
//! Creating and listing partners needs the `operator` role. Every
//! `/partners/{id}/...` route is open to operators and to the partner
//! itself when its token carries the route's scope.

use std::time::Duration;

use aurum_core::credentials::{generate_credentials, rotate_secrets};
use aurum_core::delivery::{DeliveryLog, DeliveryLogQuery, DeliveryStatus, SortOrder};
use aurum_core::error::CoreError;
use aurum_core::partners::{Partner, PartnerSummary, WebhookEndpoint};
use aurum_core::scopes::{self, LOGS_READ, LOGS_REPLAY, WEBHOOKS_READ, WEBHOOKS_WRITE};
use aurum_core::types::{EntityId, Timestamp};
use aurum_events::delivery::ReplayProgress;
use aurum_events::sandbox::{confirmation_event_type, schedule_confirmation, SANDBOX_TEST_EVENT};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{authorize_partner, RequireOperator};
use crate::query::{DeliveryLogParams, TestEventParams};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /partners`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePartnerRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    pub scopes: Option<Vec<String>>,
}

/// A partner together with its secrets in full.
///
/// Only returned on creation and rotation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerCredentials {
    pub id: EntityId,
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: String,
    pub scopes: Vec<String>,
    pub created_at: Timestamp,
}

/// Request body for `POST /partners/{id}/webhooks`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub event_types: Vec<String>,
}

/// Optional body for `POST /partners/{id}/test-event`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventRequest {
    pub event_type: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventResponse {
    pub event_type: String,
    pub delivery_ids: Vec<EntityId>,
    /// Event type of the scheduled confirmation, if one was requested.
    pub confirmation: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReplayStarted {
    pub job_id: EntityId,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Partners
// ---------------------------------------------------------------------------

/// POST /api/v1/partners
///
/// Register a partner and return its generated credentials in full. This
/// is the only response that carries the client secret.
pub async fn create_partner(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Json(input): Json<CreatePartnerRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PartnerCredentials>>)> {
    input.validate()?;
    if input.name.trim().is_empty() {
        return Err(CoreError::Validation("name must not be blank".into()).into());
    }

    let credentials = generate_credentials();
    let partner = Partner::new(
        &input.name,
        scopes::normalize(input.scopes),
        &credentials,
        Utc::now(),
    );
    let partner = state.partners.insert_partner(partner).await?;

    tracing::info!(
        partner_id = %partner.id,
        client_id = %partner.client_id,
        created_by = %operator.subject,
        "Partner created"
    );

    let data = PartnerCredentials {
        id: partner.id,
        name: partner.name,
        client_id: partner.client_id,
        client_secret: credentials.client_secret,
        webhook_secret: credentials.webhook_secret,
        scopes: partner.scopes,
        created_at: partner.created_at,
    };
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

/// GET /api/v1/partners
///
/// List partners in creation order with masked secrets.
pub async fn list_partners(
    State(state): State<AppState>,
    RequireOperator(_operator): RequireOperator,
) -> AppResult<Json<DataResponse<Vec<PartnerSummary>>>> {
    let partners = state.partners.list_partners().await?;
    let data = partners.iter().map(Partner::summary).collect();
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/partners/{id}/rotate-credentials
///
/// Regenerate the client secret and webhook secret. The client id and
/// scopes are kept; tokens already issued stay valid until they expire.
pub async fn rotate_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<PartnerCredentials>>> {
    authorize_partner(&user, id, WEBHOOKS_WRITE)?;

    let secrets = rotate_secrets();
    let partner = state.partners.rotate_secrets(id, &secrets).await?;

    tracing::info!(partner_id = %partner.id, rotated_by = %user.subject, "Partner credentials rotated");

    let data = PartnerCredentials {
        id: partner.id,
        name: partner.name,
        client_id: partner.client_id,
        client_secret: secrets.client_secret,
        webhook_secret: secrets.webhook_secret,
        scopes: partner.scopes,
        created_at: partner.created_at,
    };
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// Webhook endpoints
// ---------------------------------------------------------------------------

/// POST /api/v1/partners/{id}/webhooks
pub async fn register_webhook(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
    Json(input): Json<RegisterWebhookRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<WebhookEndpoint>>)> {
    authorize_partner(&user, id, WEBHOOKS_WRITE)?;

    let endpoint = WebhookEndpoint::new(id, &input.url, input.event_types, Utc::now())?;
    let endpoint = state.partners.insert_webhook(endpoint).await?;

    tracing::info!(
        partner_id = %id,
        webhook_id = %endpoint.id,
        url = %endpoint.url,
        event_types = ?endpoint.event_types,
        "Webhook endpoint registered"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: endpoint })))
}

/// GET /api/v1/partners/{id}/webhooks
pub async fn list_webhooks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Vec<WebhookEndpoint>>>> {
    authorize_partner(&user, id, WEBHOOKS_READ)?;
    let data = state.partners.list_webhooks(id).await?;
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// Delivery logs
// ---------------------------------------------------------------------------

/// GET /api/v1/partners/{id}/logs
///
/// Filtered, sorted and paged delivery logs. The filtered total and the
/// effective paging are echoed in `X-Total-Count`, `X-Limit` and
/// `X-Offset`.
pub async fn list_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
    Query(params): Query<DeliveryLogParams>,
) -> AppResult<impl IntoResponse> {
    authorize_partner(&user, id, LOGS_READ)?;

    let query = build_log_query(params)?;
    let page = state.delivery.list_logs(id, &query).await?;

    let headers = [
        ("x-total-count", page.total.to_string()),
        ("x-limit", page.limit.to_string()),
        ("x-offset", page.offset.to_string()),
    ];
    Ok((headers, Json(DataResponse { data: page.items })))
}

/// Turn raw query parameters into a typed log query, rejecting unknown
/// statuses, sort orders and malformed timestamps.
fn build_log_query(params: DeliveryLogParams) -> Result<DeliveryLogQuery, AppError> {
    let defaults = DeliveryLogQuery::default();
    Ok(DeliveryLogQuery {
        status: params
            .status
            .as_deref()
            .map(DeliveryStatus::parse)
            .transpose()?,
        q: params.q,
        from: params.from.as_deref().map(|v| parse_timestamp("from", v)).transpose()?,
        to: params.to.as_deref().map(|v| parse_timestamp("to", v)).transpose()?,
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
        sort: params
            .sort
            .as_deref()
            .map(SortOrder::parse)
            .transpose()?
            .unwrap_or(defaults.sort),
    })
}

fn parse_timestamp(field: &str, raw: &str) -> Result<Timestamp, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::BadRequest(format!("{field} must be an RFC 3339 timestamp: {e}")))
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// POST /api/v1/partners/{id}/webhooks/{delivery_id}/replay
///
/// Re-send one delivery synchronously and return the updated log.
pub async fn replay_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, delivery_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<DeliveryLog>>> {
    authorize_partner(&user, id, LOGS_REPLAY)?;
    let log = state.delivery.replay(id, delivery_id).await?;
    Ok(Json(DataResponse { data: log }))
}

/// POST /api/v1/partners/{id}/webhooks/replay-failed
///
/// Start a background job replaying every failed delivery of the partner.
pub async fn replay_failed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
) -> AppResult<(StatusCode, Json<DataResponse<BulkReplayStarted>>)> {
    authorize_partner(&user, id, LOGS_REPLAY)?;

    // Dropping the handle detaches the job; progress is polled by job id.
    let handle = state.delivery.start_bulk_replay(id).await?;
    let data = BulkReplayStarted {
        job_id: handle.job.job_id,
        total: handle.job.total,
    };
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data })))
}

/// GET /api/v1/partners/{id}/replay-jobs/{job_id}
pub async fn get_replay_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, job_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<ReplayProgress>>> {
    authorize_partner(&user, id, LOGS_READ)?;
    let job = state
        .delivery
        .replay_job(id, job_id)
        .await
        .ok_or(CoreError::NotFound {
            entity: "ReplayJob",
            id: job_id,
        })?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// POST /api/v1/partners/{id}/test-event
///
/// Dispatch a test event to this partner's subscribed endpoints only. With
/// `?confirm=true` a `<eventType>.confirmed` event follows after the
/// configured delay.
pub async fn send_test_event(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<EntityId>,
    Query(params): Query<TestEventParams>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<DataResponse<TestEventResponse>>)> {
    authorize_partner(&user, id, WEBHOOKS_WRITE)?;

    let input: TestEventRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TestEventRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
    };

    let event_type = input
        .event_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| SANDBOX_TEST_EVENT.to_string());
    let data = input.data.unwrap_or_else(|| serde_json::json!({ "test": true }));

    let handle = state
        .delivery
        .dispatch_to_partner(id, &event_type, &data)
        .await?;

    let confirmation = if params.confirm {
        schedule_confirmation(
            &state.delivery,
            state.scheduler.as_ref(),
            Duration::from_secs(state.config.sandbox_confirmation_delay_secs),
            id,
            &event_type,
            data,
        );
        Some(confirmation_event_type(&event_type))
    } else {
        None
    };

    tracing::info!(
        partner_id = %id,
        event_type = %event_type,
        deliveries = handle.delivery_ids.len(),
        confirm = params.confirm,
        "Sandbox test event dispatched"
    );

    let data = TestEventResponse {
        event_type,
        delivery_ids: handle.delivery_ids,
        confirmation,
    };
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data })))
}
