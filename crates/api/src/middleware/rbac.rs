//! Role and scope checks.
//!
//! Operators pass every check. Partners may only act on their own
//! `/partners/{id}` resources and need the scope the route requires.

use aurum_core::error::CoreError;
use aurum_core::scopes::has_scope;
use aurum_core::types::EntityId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `operator` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn operator_only(RequireOperator(user): RequireOperator) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireOperator(pub AuthUser);

impl FromRequestParts<AppState> for RequireOperator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_operator() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Operator role required".into(),
            )));
        }
        Ok(RequireOperator(user))
    }
}

/// Allow `user` to act on `partner_id` with `scope`.
pub fn authorize_partner(
    user: &AuthUser,
    partner_id: EntityId,
    scope: &str,
) -> Result<(), AppError> {
    if user.is_operator() {
        return Ok(());
    }
    if user.partner_id() != Some(partner_id) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Partners may only access their own resources".into(),
        )));
    }
    if !has_scope(&user.scopes, scope) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Missing required scope: {scope}"
        ))));
    }
    Ok(())
}
