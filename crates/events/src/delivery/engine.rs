//! Outbound delivery engine: fan-out, send attempts, replay and bulk replay.
//!
//! Dispatch creates one [`DeliveryLog`] per subscribed endpoint and runs
//! the first attempt for each on its own task, so a slow endpoint never
//! delays the others. There is no automatic retry; failed deliveries are
//! retried only through [`DeliveryEngine::replay`] or
//! [`DeliveryEngine::start_bulk_replay`].

use std::sync::Arc;
use std::time::Duration;

use aurum_core::circuit_breaker::{CircuitBreakerRegistry, CircuitError};
use aurum_core::delivery::{
    AttemptOutcome, DeliveryLog, DeliveryLogPage, DeliveryLogQuery, DeliveryStatus,
};
use aurum_core::partners::{breaker_name_for_url, Partner};
use aurum_core::signing::{self, SIGNATURE_HEADER};
use aurum_core::types::EntityId;
use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::replay::{ReplayJobs, ReplayProgress};
use super::webhook::{
    WebhookError, WebhookRequest, WebhookTransport, DEFAULT_DELIVERY_TIMEOUT, DELIVERY_HEADER,
    EVENT_HEADER,
};
use crate::store::{DeliveryLogRepository, PartnerRepository, StoreError};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Deliveries created by one dispatch.
///
/// Dropping the handle detaches the send tasks; [`wait`](Self::wait)
/// awaits them.
#[derive(Debug, Default)]
pub struct DispatchHandle {
    pub delivery_ids: Vec<EntityId>,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    pub async fn wait(self) {
        futures::future::join_all(self.tasks).await;
    }
}

/// A started bulk replay.
#[derive(Debug)]
pub struct BulkReplayHandle {
    pub job: ReplayProgress,
    task: JoinHandle<()>,
}

impl BulkReplayHandle {
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(job_id = %self.job.job_id, error = %e, "Bulk replay task failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DeliveryEngine {
    partners: Arc<dyn PartnerRepository>,
    logs: Arc<dyn DeliveryLogRepository>,
    transport: Arc<dyn WebhookTransport>,
    breakers: Arc<CircuitBreakerRegistry>,
    jobs: Arc<ReplayJobs>,
    timeout: Duration,
}

impl DeliveryEngine {
    pub fn new(
        partners: Arc<dyn PartnerRepository>,
        logs: Arc<dyn DeliveryLogRepository>,
        transport: Arc<dyn WebhookTransport>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            partners,
            logs,
            transport,
            breakers,
            jobs: Arc::new(ReplayJobs::new()),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Fan an event out to every endpoint subscribed to `event_type`.
    pub async fn dispatch(
        &self,
        event_type: &str,
        payload: &Value,
    ) -> Result<DispatchHandle, StoreError> {
        let partners = self.partners.list_partners().await?;
        self.fan_out(&partners, event_type, payload).await
    }

    /// Fan an event out to one partner's subscribed endpoints only.
    pub async fn dispatch_to_partner(
        &self,
        partner_id: EntityId,
        event_type: &str,
        payload: &Value,
    ) -> Result<DispatchHandle, StoreError> {
        let partner = self.require_partner(partner_id).await?;
        self.fan_out(std::slice::from_ref(&partner), event_type, payload)
            .await
    }

    async fn fan_out(
        &self,
        partners: &[Partner],
        event_type: &str,
        payload: &Value,
    ) -> Result<DispatchHandle, StoreError> {
        let now = Utc::now();
        let mut handle = DispatchHandle::default();

        for partner in partners {
            for endpoint in self.partners.list_webhooks(partner.id).await? {
                if !endpoint.subscribes_to(event_type) {
                    continue;
                }

                let log = DeliveryLog::new(
                    partner.id,
                    endpoint.id,
                    &endpoint.url,
                    event_type,
                    payload.clone(),
                    now,
                );
                let log = self.logs.insert_log(log).await?;
                let delivery_id = log.id;

                let engine = self.clone();
                handle.delivery_ids.push(delivery_id);
                handle.tasks.push(tokio::spawn(async move {
                    if let Err(e) = engine.send_attempt(delivery_id).await {
                        tracing::error!(
                            delivery_id = %delivery_id,
                            error = %e,
                            "Delivery attempt could not be recorded"
                        );
                    }
                }));
            }
        }

        tracing::debug!(
            event_type,
            deliveries = handle.delivery_ids.len(),
            "Event dispatched"
        );
        Ok(handle)
    }

    // -----------------------------------------------------------------------
    // Send attempt
    // -----------------------------------------------------------------------

    /// Run one send attempt for a delivery and return the updated log.
    ///
    /// The attempt number is reserved before any I/O; if a newer attempt
    /// is reserved while this one is in flight, this outcome is discarded.
    pub async fn send_attempt(&self, delivery_id: EntityId) -> Result<DeliveryLog, StoreError> {
        let log = self.logs.begin_attempt(delivery_id, Utc::now()).await?;
        let attempt = log.attempt;
        let partner = self.require_partner(log.partner_id).await?;

        let outcome = self.attempt(&log, &partner.webhook_secret).await;
        let applied = self
            .logs
            .record_outcome(delivery_id, attempt, &outcome)
            .await?;

        match (&outcome, applied) {
            (_, false) => tracing::debug!(
                delivery_id = %delivery_id,
                attempt,
                "Discarded outcome of superseded attempt"
            ),
            (AttemptOutcome::Delivered { status, .. }, true) => tracing::info!(
                delivery_id = %delivery_id,
                event_type = %log.event_type,
                attempt,
                status,
                "Webhook delivered"
            ),
            (AttemptOutcome::Failed { error, .. }, true) => tracing::warn!(
                delivery_id = %delivery_id,
                event_type = %log.event_type,
                url = %log.webhook_url,
                attempt,
                error = %error,
                "Webhook delivery failed"
            ),
        }

        self.logs
            .find_log(delivery_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "DeliveryLog",
                id: delivery_id,
            })
    }

    async fn attempt(&self, log: &DeliveryLog, secret: &str) -> AttemptOutcome {
        let signed = signing::sign(&log.envelope(), secret, None);
        let request = WebhookRequest {
            url: log.webhook_url.clone(),
            headers: vec![
                ("content-type".into(), "application/json".into()),
                (SIGNATURE_HEADER.into(), signed.signature),
                (EVENT_HEADER.into(), log.event_type.clone()),
                (DELIVERY_HEADER.into(), log.id.to_string()),
            ],
            body: signed.body,
        };

        let breaker = self.breakers.get(&breaker_name_for_url(&log.webhook_url)).await;
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;

        let result = breaker
            .call(|| async move {
                match tokio::time::timeout(timeout, transport.post(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(WebhookError::Timeout(timeout)),
                }
            })
            .await;

        match result {
            Ok(response) => AttemptOutcome::Delivered {
                status: response.status,
                body: response.body,
            },
            Err(CircuitError::Open { name }) => AttemptOutcome::Failed {
                status: None,
                body: None,
                error: WebhookError::CircuitOpen(name).to_string(),
            },
            Err(CircuitError::Inner(err)) => {
                let (status, body) = match &err {
                    WebhookError::HttpStatus { status, body } => (Some(*status), Some(body.clone())),
                    _ => (None, None),
                };
                AttemptOutcome::Failed {
                    status,
                    body,
                    error: err.to_string(),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    /// Re-send one of a partner's deliveries, re-signed with the current time.
    pub async fn replay(
        &self,
        partner_id: EntityId,
        delivery_id: EntityId,
    ) -> Result<DeliveryLog, StoreError> {
        self.require_partner(partner_id).await?;
        let owned = self
            .logs
            .find_log(delivery_id)
            .await?
            .is_some_and(|log| log.partner_id == partner_id);
        if !owned {
            return Err(StoreError::NotFound {
                entity: "DeliveryLog",
                id: delivery_id,
            });
        }

        tracing::info!(partner_id = %partner_id, delivery_id = %delivery_id, "Replaying delivery");
        self.send_attempt(delivery_id).await
    }

    /// Start serially replaying every currently failed delivery of a partner.
    pub async fn start_bulk_replay(
        &self,
        partner_id: EntityId,
    ) -> Result<BulkReplayHandle, StoreError> {
        self.require_partner(partner_id).await?;

        let mut failed: Vec<DeliveryLog> = self
            .logs
            .list_for_partner(partner_id)
            .await?
            .into_iter()
            .filter(|log| log.status == DeliveryStatus::Failed)
            .collect();
        failed.sort_by_key(|log| log.timestamp);
        let ids: Vec<EntityId> = failed.iter().map(|log| log.id).collect();

        let job = self.jobs.create(partner_id, ids.len()).await;
        tracing::info!(
            partner_id = %partner_id,
            job_id = %job.job_id,
            total = ids.len(),
            "Bulk replay started"
        );

        let engine = self.clone();
        let job_id = job.job_id;
        let task = tokio::spawn(async move { engine.run_bulk_replay(job_id, ids).await });

        Ok(BulkReplayHandle { job, task })
    }

    async fn run_bulk_replay(&self, job_id: EntityId, ids: Vec<EntityId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            let delivered = match self.send_attempt(id).await {
                Ok(log) => log.status == DeliveryStatus::Delivered,
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        delivery_id = %id,
                        error = %e,
                        "Bulk replay item failed"
                    );
                    false
                }
            };
            self.jobs.record(job_id, delivered).await;
        }
        self.jobs.finish(job_id).await;
        tracing::info!(job_id = %job_id, "Bulk replay finished");
    }

    pub async fn replay_job(
        &self,
        partner_id: EntityId,
        job_id: EntityId,
    ) -> Option<ReplayProgress> {
        self.jobs.get(partner_id, job_id).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn list_logs(
        &self,
        partner_id: EntityId,
        query: &DeliveryLogQuery,
    ) -> Result<DeliveryLogPage, StoreError> {
        self.require_partner(partner_id).await?;
        let logs = self.logs.list_for_partner(partner_id).await?;
        Ok(query.apply(logs))
    }

    async fn require_partner(&self, partner_id: EntityId) -> Result<Partner, StoreError> {
        self.partners
            .find_partner(partner_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "Partner",
                id: partner_id,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use aurum_core::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use aurum_core::credentials::generate_credentials;
    use aurum_core::partners::WebhookEndpoint;
    use serde_json::json;

    use super::*;
    use crate::delivery::webhook::WebhookResponse;
    use crate::store::{InMemoryDeliveryLogRepository, InMemoryPartnerRepository};

    /// Answers every POST with a configurable status; `None` hangs forever.
    #[derive(Default)]
    struct FakeTransport {
        status: Mutex<Option<u16>>,
        requests: Mutex<Vec<WebhookRequest>>,
    }

    impl FakeTransport {
        fn answering(status: Option<u16>) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(status),
                requests: Mutex::default(),
            })
        }

        fn set_status(&self, status: Option<u16>) {
            *self.status.lock().unwrap() = status;
        }

        fn requests(&self) -> Vec<WebhookRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookTransport for FakeTransport {
        async fn post(&self, request: WebhookRequest) -> Result<WebhookResponse, WebhookError> {
            self.requests.lock().unwrap().push(request);
            let status = *self.status.lock().unwrap();
            match status {
                None => std::future::pending().await,
                Some(s) if (200..300).contains(&s) => Ok(WebhookResponse {
                    status: s,
                    body: "ok".into(),
                }),
                Some(s) => Err(WebhookError::HttpStatus {
                    status: s,
                    body: "nope".into(),
                }),
            }
        }
    }

    struct Fixture {
        engine: DeliveryEngine,
        partners: Arc<InMemoryPartnerRepository>,
        transport: Arc<FakeTransport>,
    }

    fn fixture(status: Option<u16>, breaker: CircuitBreakerConfig) -> Fixture {
        let partners = Arc::new(InMemoryPartnerRepository::new());
        let logs = Arc::new(InMemoryDeliveryLogRepository::new());
        let transport = FakeTransport::answering(status);
        let breakers = Arc::new(CircuitBreakerRegistry::new(breaker, HashMap::new()));
        let engine = DeliveryEngine::new(partners.clone(), logs, transport.clone(), breakers);
        Fixture {
            engine,
            partners,
            transport,
        }
    }

    async fn partner_with_endpoints(
        repo: &InMemoryPartnerRepository,
        endpoints: &[(&str, &[&str])],
    ) -> Partner {
        let partner = Partner::new("Acme", vec!["*".into()], &generate_credentials(), Utc::now());
        let partner = repo.insert_partner(partner).await.unwrap();
        for (url, events) in endpoints {
            let endpoint = WebhookEndpoint::new(
                partner.id,
                url,
                events.iter().map(|e| e.to_string()).collect(),
                Utc::now(),
            )
            .unwrap();
            repo.insert_webhook(endpoint).await.unwrap();
        }
        repo.find_partner(partner.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn dispatch_reaches_only_subscribed_endpoints() {
        let f = fixture(Some(200), CircuitBreakerConfig::default());
        let partner = partner_with_endpoints(
            &f.partners,
            &[("https://one.example.com/h", &["a"]), ("https://two.example.com/h", &["b"])],
        )
        .await;

        let handle = f.engine.dispatch("a", &json!({"id": 1})).await.unwrap();
        assert_eq!(handle.delivery_ids.len(), 1);
        let id = handle.delivery_ids[0];
        handle.wait().await;

        let page = f.engine.list_logs(partner.id, &DeliveryLogQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        let log = &page.items[0];
        assert_eq!(log.id, id);
        assert_eq!(log.webhook_url, "https://one.example.com/h");
        assert_eq!(log.status, DeliveryStatus::Delivered);
        assert_eq!(log.attempt, 1);
        assert_eq!(log.response_status, Some(200));
    }

    #[tokio::test]
    async fn outbound_request_is_signed_with_partner_secret() {
        let f = fixture(Some(204), CircuitBreakerConfig::default());
        let partner =
            partner_with_endpoints(&f.partners, &[("https://one.example.com/h", &["a"])]).await;

        f.engine.dispatch("a", &json!({"n": 1})).await.unwrap().wait().await;

        let requests = f.transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        let signature = request
            .headers
            .iter()
            .find(|(name, _)| name == SIGNATURE_HEADER)
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(signing::verify(&request.body, &signature, &partner.webhook_secret, 300));

        let envelope: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(envelope["event"], "a");
        assert_eq!(envelope["data"], json!({"n": 1}));
        assert!(envelope["createdAt"].is_string());
    }

    #[tokio::test]
    async fn non_success_status_marks_delivery_failed() {
        let f = fixture(Some(500), CircuitBreakerConfig::default());
        let partner =
            partner_with_endpoints(&f.partners, &[("https://one.example.com/h", &["a"])]).await;

        f.engine.dispatch("a", &json!({})).await.unwrap().wait().await;

        let page = f.engine.list_logs(partner.id, &DeliveryLogQuery::default()).await.unwrap();
        let log = &page.items[0];
        assert_eq!(log.status, DeliveryStatus::Failed);
        assert_eq!(log.last_error.as_deref(), Some("HTTP 500"));
        assert_eq!(log.response_status, Some(500));
        assert_eq!(log.response_body.as_deref(), Some("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_endpoint_times_out_without_blocking_others() {
        let f = fixture(None, CircuitBreakerConfig::default());
        let partner = partner_with_endpoints(
            &f.partners,
            &[("https://slow.example.com/h", &["a"]), ("https://fast.example.com/h", &["a"])],
        )
        .await;

        f.engine.dispatch("a", &json!({})).await.unwrap().wait().await;

        let page = f.engine.list_logs(partner.id, &DeliveryLogQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        for log in page.items {
            assert_eq!(log.status, DeliveryStatus::Failed);
            assert_eq!(log.last_error.as_deref(), Some("request timed out after 8s"));
        }
    }

    #[tokio::test]
    async fn replay_increments_attempt_and_takes_new_outcome() {
        let f = fixture(Some(503), CircuitBreakerConfig::default());
        let partner =
            partner_with_endpoints(&f.partners, &[("https://one.example.com/h", &["a"])]).await;
        let handle = f.engine.dispatch("a", &json!({})).await.unwrap();
        let id = handle.delivery_ids[0];
        handle.wait().await;

        f.transport.set_status(Some(200));
        let log = f.engine.replay(partner.id, id).await.unwrap();
        assert_eq!(log.attempt, 2);
        assert_eq!(log.status, DeliveryStatus::Delivered);
        assert_eq!(log.last_error, None);

        f.transport.set_status(Some(502));
        let log = f.engine.replay(partner.id, id).await.unwrap();
        assert_eq!(log.attempt, 3);
        assert_eq!(log.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn replay_of_foreign_delivery_is_not_found() {
        let f = fixture(Some(200), CircuitBreakerConfig::default());
        let owner =
            partner_with_endpoints(&f.partners, &[("https://one.example.com/h", &["a"])]).await;
        let other = partner_with_endpoints(&f.partners, &[]).await;
        let handle = f.engine.dispatch("a", &json!({})).await.unwrap();
        let id = handle.delivery_ids[0];
        handle.wait().await;

        assert!(f.engine.replay(owner.id, id).await.is_ok());
        assert_matches!(
            f.engine.replay(other.id, id).await,
            Err(StoreError::NotFound { entity: "DeliveryLog", .. })
        );
    }

    #[tokio::test]
    async fn open_breaker_fails_attempt_without_network_io() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        };
        let f = fixture(Some(500), config);
        let partner =
            partner_with_endpoints(&f.partners, &[("https://flaky.example.com/h", &["a"])]).await;

        for _ in 0..3 {
            f.engine.dispatch("a", &json!({})).await.unwrap().wait().await;
        }

        assert_eq!(f.transport.requests().len(), 2);
        assert_eq!(
            f.engine.breakers().get_state("webhook:flaky.example.com").await,
            Some(CircuitState::Open)
        );

        let page = f
            .engine
            .list_logs(
                partner.id,
                &DeliveryLogQuery {
                    q: Some("circuit breaker".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(
            page.items[0].last_error.as_deref(),
            Some("circuit breaker open: webhook:flaky.example.com")
        );
    }

    #[tokio::test]
    async fn bulk_replay_retries_every_failed_delivery() {
        let f = fixture(Some(500), CircuitBreakerConfig::default());
        let partner = partner_with_endpoints(
            &f.partners,
            &[
                ("https://one.example.com/h", &["a"]),
                ("https://two.example.com/h", &["a"]),
                ("https://three.example.com/h", &["a"]),
            ],
        )
        .await;
        f.engine.dispatch("a", &json!({})).await.unwrap().wait().await;

        f.transport.set_status(Some(200));
        let handle = f.engine.start_bulk_replay(partner.id).await.unwrap();
        assert_eq!(handle.job.total, 3);
        let job_id = handle.job.job_id;
        handle.wait().await;

        let progress = f.engine.replay_job(partner.id, job_id).await.unwrap();
        assert_eq!(progress.done, 3);
        assert_eq!(progress.delivered, 3);
        assert_eq!(progress.failed, 0);
        assert!(progress.finished);

        let failed = f
            .engine
            .list_logs(
                partner.id,
                &DeliveryLogQuery {
                    status: Some(DeliveryStatus::Failed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.total, 0);
    }

    #[tokio::test]
    async fn bulk_replay_tolerates_individual_failures() {
        let f = fixture(Some(500), CircuitBreakerConfig::default());
        let partner = partner_with_endpoints(
            &f.partners,
            &[("https://one.example.com/h", &["a"]), ("https://two.example.com/h", &["a"])],
        )
        .await;
        f.engine.dispatch("a", &json!({})).await.unwrap().wait().await;

        let handle = f.engine.start_bulk_replay(partner.id).await.unwrap();
        let job_id = handle.job.job_id;
        handle.wait().await;

        let progress = f.engine.replay_job(partner.id, job_id).await.unwrap();
        assert_eq!((progress.done, progress.failed), (2, 2));
        assert!(progress.finished);
    }

    #[tokio::test]
    async fn dispatch_to_unknown_partner_is_not_found() {
        let f = fixture(Some(200), CircuitBreakerConfig::default());
        assert_matches!(
            f.engine
                .dispatch_to_partner(uuid::Uuid::new_v4(), "a", &json!({}))
                .await,
            Err(StoreError::NotFound { entity: "Partner", .. })
        );
    }
}
