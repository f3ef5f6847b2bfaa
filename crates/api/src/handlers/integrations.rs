//! Handlers for `/integrations`.

use aurum_core::circuit_breaker::CircuitBreakerSnapshot;
use axum::extract::State;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::rbac::RequireOperator;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/integrations/circuit-breakers
///
/// State and counters of every breaker created so far, sorted by name.
pub async fn circuit_breakers(
    State(state): State<AppState>,
    RequireOperator(_operator): RequireOperator,
) -> AppResult<Json<DataResponse<Vec<CircuitBreakerSnapshot>>>> {
    let data = state.delivery.breakers().snapshot().await;
    Ok(Json(DataResponse { data }))
}
