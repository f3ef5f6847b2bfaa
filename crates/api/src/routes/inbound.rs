//! Route definitions for the inbound `/webhooks` surface.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::inbound;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// GET    /logs                    -> list_logs (operator)
/// GET    /stats                   -> stats (operator)
/// GET    /kpis                    -> kpis (operator)
/// POST   /{provider}              -> receive (public, signature-checked)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs", get(inbound::list_logs))
        .route("/stats", get(inbound::stats))
        .route("/kpis", get(inbound::kpis))
        .route("/{provider}", post(inbound::receive))
}
