use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `connected`, `unavailable`, or `disabled` when no database is configured.
    pub database: &'static str,
}

/// GET /health -- returns service and database health.
///
/// The service stays `ok` without a database: durable inbound storage is
/// optional and the in-memory log keeps working.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.pool {
        None => "disabled",
        Some(pool) => match aurum_db::health_check(pool).await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "unavailable"
            }
        },
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
