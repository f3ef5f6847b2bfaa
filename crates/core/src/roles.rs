//! Well-known role name constants carried in access tokens.

/// Platform operators; may use every control-plane route.
pub const ROLE_OPERATOR: &str = "operator";

/// Partner API consumers; limited to their own resources and scopes.
pub const ROLE_PARTNER: &str = "partner";
