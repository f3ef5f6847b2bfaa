//! Route definitions for `/oauth`.

use axum::routing::post;
use axum::Router;

use crate::handlers::oauth;
use crate::state::AppState;

/// Routes mounted at `/oauth`.
///
/// ```text
/// POST   /token                   -> issue_token
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/token", post(oauth::issue_token))
}
