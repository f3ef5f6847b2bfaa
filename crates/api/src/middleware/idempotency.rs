//! `Idempotency-Key` handling for mutating control-plane requests.
//!
//! The first request with a key reserves it and runs the handler. A 2xx
//! response is cached and replayed verbatim (allowlisted headers only) to
//! later requests with the same method, route, key and token subject. A
//! non-2xx response releases the reservation so the caller can retry. A
//! handler that panics or is cancelled releases it through
//! [`ReservationGuard`].
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/", post(handler))
//!     .route_layer(middleware::from_fn_with_state(state, idempotency_middleware));
//! ```

use std::sync::Arc;

use aurum_core::error::CoreError;
use aurum_core::idempotency::{
    lookup_key, validate_key, CachedResponse, IdempotencyStore, ReserveOutcome,
    IDEMPOTENCY_KEY_HEADER,
    REPLAYED_HEADER, REPLAYED_HEADER_ALLOWLIST,
};
use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::auth::jwt::validate_token;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match handle(state, request, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

async fn handle(state: AppState, request: Request, next: Next) -> AppResult<Response> {
    if !is_mutating(request.method()) {
        return Ok(next.run(request).await);
    }
    let Some(raw_key) = request.headers().get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(next.run(request).await);
    };

    let key = raw_key.to_str().map_err(|_| {
        CoreError::Validation("Idempotency-Key must contain only visible ASCII characters".into())
    })?;
    validate_key(key)?;

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let subject = bearer_subject(request.headers(), &state);
    let lookup = lookup_key(request.method().as_str(), &route, key, subject.as_deref());

    let ttl = chrono::Duration::hours(state.config.idempotency_ttl_hours);
    match state.idempotency.reserve(&lookup, Utc::now(), ttl).await? {
        ReserveOutcome::Replay(cached) => {
            tracing::debug!(route = %route, status = cached.status, "Replaying idempotent response");
            return Ok(replay_response(cached));
        }
        ReserveOutcome::InFlight => return Err(AppError::IdempotencyInProgress),
        ReserveOutcome::Reserved => {}
    }

    let guard = ReservationGuard::new(Arc::clone(&state.idempotency), lookup.clone());
    let response = next.run(request).await;

    if !response.status().is_success() {
        guard.release().await;
        return Ok(response);
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            guard.release().await;
            return Err(AppError::InternalError(format!(
                "failed to buffer response body: {e}"
            )));
        }
    };
    guard.disarm();

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: allowlisted_headers(&parts.headers),
        body: bytes.to_vec(),
    };
    if let Err(e) = state
        .idempotency
        .complete(&lookup, cached, Utc::now(), ttl)
        .await
    {
        tracing::error!(error = %e, route = %route, "Failed to cache idempotent response");
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Releases a reservation unless it is disarmed first.
///
/// Dropping an armed guard (handler panic, cancelled request) releases the
/// key on a spawned task, since `Drop` cannot await.
struct ReservationGuard {
    store: Arc<dyn IdempotencyStore>,
    key: Option<String>,
}

impl ReservationGuard {
    fn new(store: Arc<dyn IdempotencyStore>, key: String) -> Self {
        Self {
            store,
            key: Some(key),
        }
    }

    /// Release now, before the response is returned.
    async fn release(mut self) {
        if let Some(key) = self.key.take() {
            release_key(self.store.as_ref(), &key).await;
        }
    }

    /// Keep the reservation; the caller completes it.
    fn disarm(mut self) {
        self.key = None;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No runtime to release abandoned idempotency reservation");
            return;
        };
        tracing::warn!("Request ended without a response, releasing idempotency reservation");
        let store = Arc::clone(&self.store);
        runtime.spawn(async move {
            release_key(store.as_ref(), &key).await;
        });
    }
}

async fn release_key(store: &dyn IdempotencyStore, key: &str) {
    if let Err(e) = store.release(key).await {
        tracing::error!(error = %e, "Failed to release idempotency reservation");
    }
}

/// Subject of a valid bearer token, used to namespace keys per caller.
fn bearer_subject(headers: &HeaderMap, state: &AppState) -> Option<String> {
    let token = headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    validate_token(token, &state.config.jwt)
        .ok()
        .map(|claims| claims.sub)
}

fn allowlisted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    REPLAYED_HEADER_ALLOWLIST
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn replay_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Body::from(cached.body)).into_response();

    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(REPLAYED_HEADER),
        HeaderValue::from_static("true"),
    );
    response
}
