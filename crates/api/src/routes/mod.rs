pub mod events;
pub mod health;
pub mod inbound;
pub mod integrations;
pub mod oauth;
pub mod partners;

use axum::middleware;
use axum::Router;

use crate::middleware::idempotency::idempotency_middleware;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /oauth/token                                       client-credentials grant (public)
///
/// /partners                                          list, create (operator)
/// /partners/{id}/rotate-credentials                  rotate secrets (POST)
/// /partners/{id}/webhooks                            list, register
/// /partners/{id}/webhooks/{delivery_id}/replay       replay one delivery (POST)
/// /partners/{id}/webhooks/replay-failed              bulk replay (POST)
/// /partners/{id}/replay-jobs/{job_id}                bulk replay progress (GET)
/// /partners/{id}/logs                                delivery logs (GET)
/// /partners/{id}/test-event                          sandbox dispatch (POST)
///
/// /events                                            publish domain event (operator)
///
/// /webhooks/{provider}                               inbound provider callback (public)
/// /webhooks/logs                                     inbound log (operator)
/// /webhooks/stats                                    windowed counters (operator)
/// /webhooks/kpis                                     multi-window KPIs (operator)
///
/// /integrations/circuit-breakers                     breaker snapshot (operator)
/// ```
///
/// Mutating `/partners` and `/events` routes honour `Idempotency-Key`.
/// Provider callbacks dedupe by event id instead.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let idempotency = middleware::from_fn_with_state(state.clone(), idempotency_middleware);

    Router::new()
        .nest("/oauth", oauth::router())
        .nest("/partners", partners::router().route_layer(idempotency.clone()))
        .nest("/events", events::router().route_layer(idempotency))
        .nest("/webhooks", inbound::router())
        .nest("/integrations", integrations::router())
}
