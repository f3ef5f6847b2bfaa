#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aurum_api::auth::jwt::{generate_access_token, JwtConfig};
use aurum_api::config::ServerConfig;
use aurum_api::router::build_app_router;
use aurum_api::state::AppState;
use aurum_core::circuit_breaker::CircuitBreakerConfig;
use aurum_core::roles::{ROLE_OPERATOR, ROLE_PARTNER};
use aurum_events::delivery::{WebhookError, WebhookRequest, WebhookResponse, WebhookTransport};
use aurum_events::{ManualScheduler, StaticSecrets};
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-for-integration-tests";

/// Secret configured for the `acme` inbound provider.
pub const ACME_SECRET: &str = "acme-shared-secret";

/// Build a test `ServerConfig` with safe defaults and no database.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        database_url: None,
        delivery_timeout_secs: 8,
        idempotency_ttl_hours: 24,
        inbound_retention_days: 30,
        inbound_ring_capacity: 1000,
        signature_tolerance_secs: 300,
        sandbox_confirmation_delay_secs: 2,
        breaker_defaults: CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        },
        breaker_overrides: HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Fake outbound transport
// ---------------------------------------------------------------------------

/// Records every outbound request and answers with a fixed status.
pub struct FakeTransport {
    pub requests: Mutex<Vec<WebhookRequest>>,
    status: Mutex<u16>,
}

impl FakeTransport {
    pub fn new(status: u16) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            status: Mutex::new(status),
        }
    }

    pub fn set_status(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl WebhookTransport for FakeTransport {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, WebhookError> {
        self.requests.lock().unwrap().push(request);
        let status = *self.status.lock().unwrap();
        if (200..300).contains(&status) {
            Ok(WebhookResponse {
                status,
                body: "ok".into(),
            })
        } else {
            Err(WebhookError::HttpStatus {
                status,
                body: "unavailable".into(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Test app
// ---------------------------------------------------------------------------

/// The full router plus handles on its in-process collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub transport: Arc<FakeTransport>,
    pub scheduler: Arc<ManualScheduler>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    pub fn operator_token(&self) -> String {
        generate_access_token("ops@test", ROLE_OPERATOR, &[], &self.state.config.jwt).unwrap()
    }

    pub fn partner_token(&self, partner_id: &str, scopes: &[&str]) -> String {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        generate_access_token(partner_id, ROLE_PARTNER, &scopes, &self.state.config.jwt).unwrap()
    }
}

/// Build the application through the same [`build_app_router`] as
/// `main.rs`, over in-memory state, a fake transport answering 200 and a
/// manual scheduler.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let transport = Arc::new(FakeTransport::new(200));
    let scheduler = Arc::new(ManualScheduler::new());
    let secrets = StaticSecrets::new().with("acme", ACME_SECRET);

    let state = AppState::new(
        Arc::new(config.clone()),
        None,
        transport.clone(),
        scheduler.clone(),
        Arc::new(secrets),
    );
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        transport,
        scheduler,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_empty_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Create a partner as an operator and return the `data` object.
pub async fn create_partner(test: &TestApp, name: &str, scopes: Option<&[&str]>) -> serde_json::Value {
    let mut body = serde_json::json!({ "name": name });
    if let Some(scopes) = scopes {
        body["scopes"] = serde_json::json!(scopes);
    }
    let response =
        post_json_auth(test.app(), "/api/v1/partners", &test.operator_token(), body).await;
    assert_eq!(response.status(), 201);
    body_json(response).await["data"].clone()
}

/// Register an endpoint for `partner_id` as an operator.
pub async fn register_webhook(
    test: &TestApp,
    partner_id: &str,
    url: &str,
    event_types: &[&str],
) -> serde_json::Value {
    let response = post_json_auth(
        test.app(),
        &format!("/api/v1/partners/{partner_id}/webhooks"),
        &test.operator_token(),
        serde_json::json!({ "url": url, "eventTypes": event_types }),
    )
    .await;
    assert_eq!(response.status(), 201);
    body_json(response).await["data"].clone()
}

/// Poll a partner's logs until `count` entries have left `queued`.
pub async fn wait_for_settled_logs(test: &TestApp, partner_id: &str, count: usize) -> Vec<serde_json::Value> {
    for _ in 0..100 {
        let response = get_auth(
            test.app(),
            &format!("/api/v1/partners/{partner_id}/logs"),
            &test.operator_token(),
        )
        .await;
        let logs = body_json(response).await["data"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let settled = logs.iter().filter(|l| l["status"] != "queued").count();
        if logs.len() >= count && settled >= count {
            return logs;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deliveries for {partner_id} did not settle");
}
