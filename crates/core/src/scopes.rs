//! Partner capability scopes.

/// Grants every scope.
pub const ALL: &str = "*";
pub const WEBHOOKS_READ: &str = "webhooks:read";
pub const WEBHOOKS_WRITE: &str = "webhooks:write";
pub const LOGS_READ: &str = "logs:read";
pub const LOGS_REPLAY: &str = "logs:replay";

/// Whether a granted scope set covers `required`.
pub fn has_scope(granted: &[String], required: &str) -> bool {
    granted.iter().any(|s| s == ALL || s == required)
}

/// Trim, drop empties and deduplicate scopes, defaulting to `["*"]`.
pub fn normalize(scopes: Option<Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for scope in scopes.unwrap_or_default() {
        let scope = scope.trim();
        if !scope.is_empty() && !out.iter().any(|s| s == scope) {
            out.push(scope.to_string());
        }
    }
    if out.is_empty() {
        out.push(ALL.to_string());
    }
    out
}
