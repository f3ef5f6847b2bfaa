//! Route definitions for `/integrations`.

use axum::routing::get;
use axum::Router;

use crate::handlers::integrations;
use crate::state::AppState;

/// Routes mounted at `/integrations`.
///
/// ```text
/// GET    /circuit-breakers        -> circuit_breakers (operator)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/circuit-breakers", get(integrations::circuit_breakers))
}
