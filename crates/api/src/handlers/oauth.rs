//! OAuth2 client-credentials token endpoint for partners.

use aurum_core::credentials::hash_secret;
use aurum_core::error::CoreError;
use aurum_core::roles::ROLE_PARTNER;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::generate_access_token;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const CLIENT_CREDENTIALS: &str = "client_credentials";

/// Request body for `POST /oauth/token`.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Space-separated granted scopes.
    pub scope: String,
}

/// POST /api/v1/oauth/token
///
/// Exchange a partner's client id and secret for a bearer token carrying
/// the partner's scopes. Unknown ids and wrong secrets get the same 401.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(input): Json<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    if input.grant_type != CLIENT_CREDENTIALS {
        return Err(AppError::BadRequest(format!(
            "Unsupported grant_type '{}', expected {CLIENT_CREDENTIALS}",
            input.grant_type
        )));
    }

    let invalid = || AppError::Core(CoreError::Unauthorized("Invalid client credentials".into()));

    let partner = state
        .partners
        .find_partner_by_client_id(input.client_id.trim())
        .await?
        .ok_or_else(invalid)?;

    if hash_secret(&input.client_secret) != partner.client_secret_hash {
        tracing::info!(client_id = %partner.client_id, "Rejected client credentials");
        return Err(invalid());
    }

    let access_token = generate_access_token(
        &partner.id.to_string(),
        ROLE_PARTNER,
        &partner.scopes,
        &state.config.jwt,
    )
    .map_err(|e| AppError::InternalError(format!("Token generation failed: {e}")))?;

    tracing::info!(partner_id = %partner.id, "Issued partner access token");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.config.jwt.access_token_expiry_mins * 60,
        scope: partner.scopes.join(" "),
    }))
}
