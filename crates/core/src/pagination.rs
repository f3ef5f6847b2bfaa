//! Limit/offset clamping shared by every paginated listing.

/// Default page size for delivery log listings.
pub const DEFAULT_DELIVERY_LOG_LIMIT: i64 = 50;

/// Maximum page size for delivery log listings.
pub const MAX_DELIVERY_LOG_LIMIT: i64 = 200;

/// Default page size for inbound event listings.
pub const DEFAULT_INBOUND_LOG_LIMIT: i64 = 50;

/// Maximum page size for inbound event listings.
pub const MAX_INBOUND_LOG_LIMIT: i64 = 500;

/// Clamp a user-provided limit to `[1, max]`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Apply an already-clamped limit/offset pair to an in-memory slice.
pub fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
