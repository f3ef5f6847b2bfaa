//! JWT-based authentication extractor for Axum handlers.

use aurum_core::error::CoreError;
use aurum_core::roles::{ROLE_OPERATOR, ROLE_PARTNER};
use aurum_core::types::EntityId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Caller extracted from a JWT Bearer token in the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Token subject (`claims.sub`).
    pub subject: String,
    /// `"operator"` or `"partner"`.
    pub role: String,
    pub scopes: Vec<String>,
}

impl AuthUser {
    pub fn is_operator(&self) -> bool {
        self.role == ROLE_OPERATOR
    }

    /// The partner this token was issued to, for partner tokens.
    pub fn partner_id(&self) -> Option<EntityId> {
        if self.role != ROLE_PARTNER {
            return None;
        }
        self.subject.parse().ok()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            subject: claims.sub,
            role: claims.role,
            scopes: claims.scopes,
        })
    }
}
