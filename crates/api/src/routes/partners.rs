//! Route definitions for the `/partners` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::partners;
use crate::state::AppState;

/// Routes mounted at `/partners`.
///
/// Role and scope checks are enforced by handler extractors.
///
/// ```text
/// GET    /                                      -> list_partners
/// POST   /                                      -> create_partner
/// POST   /{id}/rotate-credentials               -> rotate_credentials
/// GET    /{id}/webhooks                         -> list_webhooks
/// POST   /{id}/webhooks                         -> register_webhook
/// POST   /{id}/webhooks/replay-failed           -> replay_failed
/// POST   /{id}/webhooks/{delivery_id}/replay    -> replay_delivery
/// GET    /{id}/replay-jobs/{job_id}             -> get_replay_job
/// GET    /{id}/logs                             -> list_logs
/// POST   /{id}/test-event                       -> send_test_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(partners::list_partners).post(partners::create_partner),
        )
        .route(
            "/{id}/rotate-credentials",
            post(partners::rotate_credentials),
        )
        .route(
            "/{id}/webhooks",
            get(partners::list_webhooks).post(partners::register_webhook),
        )
        .route("/{id}/webhooks/replay-failed", post(partners::replay_failed))
        .route(
            "/{id}/webhooks/{delivery_id}/replay",
            post(partners::replay_delivery),
        )
        .route("/{id}/replay-jobs/{job_id}", get(partners::get_replay_job))
        .route("/{id}/logs", get(partners::list_logs))
        .route("/{id}/test-event", post(partners::send_test_event))
}
