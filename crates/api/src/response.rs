//! Shared response envelope types for API handlers.
//!
//! Control-plane responses use a `{ "data": ... }` envelope. The inbound
//! webhook surface answers providers with bare objects instead.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: items }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
