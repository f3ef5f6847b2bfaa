//! Domain event intake.

use aurum_core::error::CoreError;
use aurum_events::DomainEvent;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::middleware::rbac::RequireOperator;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /events`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPublished {
    pub event_type: String,
    /// Bus subscribers that will see the event.
    pub receivers: usize,
}

/// POST /api/v1/events
///
/// Publish a domain event on the bus. The outbound relay fans it out to
/// every subscribed partner endpoint asynchronously.
pub async fn publish_event(
    State(state): State<AppState>,
    RequireOperator(operator): RequireOperator,
    Json(input): Json<PublishEventRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<EventPublished>>)> {
    let event_type = input.event_type.trim().to_string();
    if event_type.is_empty() {
        return Err(CoreError::Validation("eventType must not be empty".into()).into());
    }

    let event = DomainEvent::new(event_type.clone())
        .with_payload(input.data.unwrap_or_else(|| Value::Object(Default::default())))
        .with_actor(operator.subject);
    let receivers = state.event_bus.publish(event);

    tracing::info!(event_type = %event_type, receivers, "Domain event published");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: EventPublished {
                event_type,
                receivers,
            },
        }),
    ))
}
