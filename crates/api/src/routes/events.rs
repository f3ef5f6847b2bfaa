//! Route definitions for `/events`.

use axum::routing::post;
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Routes mounted at `/events`.
///
/// ```text
/// POST   /                        -> publish_event (operator)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(events::publish_event))
}
