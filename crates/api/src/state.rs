use std::sync::Arc;
use std::time::Duration;

use aurum_core::circuit_breaker::CircuitBreakerRegistry;
use aurum_core::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
use aurum_events::delivery::WebhookTransport;
use aurum_events::{
    DeliveryEngine, EventBus, InMemoryDeliveryLogRepository, InMemoryPartnerRepository,
    InboundConfig, InboundLog, PartnerRepository, Scheduler, SecretSource,
};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is an `Arc`, a pool handle or a clonable
/// engine.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, present only when `DATABASE_URL` is configured.
    pub pool: Option<aurum_db::DbPool>,
    pub config: Arc<ServerConfig>,
    pub partners: Arc<dyn PartnerRepository>,
    /// Outbound delivery engine (also owns the circuit breaker registry).
    pub delivery: DeliveryEngine,
    pub inbound: Arc<InboundLog>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Runs deferred sandbox confirmations.
    pub scheduler: Arc<dyn Scheduler>,
    /// Centralized event bus for publishing domain events.
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    /// Wire the in-process registries, engines and stores from `config`.
    pub fn new(
        config: Arc<ServerConfig>,
        pool: Option<aurum_db::DbPool>,
        transport: Arc<dyn WebhookTransport>,
        scheduler: Arc<dyn Scheduler>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        let partners: Arc<dyn PartnerRepository> = Arc::new(InMemoryPartnerRepository::new());
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.breaker_defaults.clone(),
            config.breaker_overrides.clone(),
        ));

        let delivery = DeliveryEngine::new(
            Arc::clone(&partners),
            Arc::new(InMemoryDeliveryLogRepository::new()),
            transport,
            breakers,
        )
        .with_timeout(Duration::from_secs(config.delivery_timeout_secs));

        let inbound = Arc::new(InboundLog::new(
            pool.clone(),
            secrets,
            InboundConfig {
                retention: chrono::Duration::days(config.inbound_retention_days),
                ring_capacity: config.inbound_ring_capacity,
                tolerance_secs: config.signature_tolerance_secs,
            },
        ));

        Self {
            pool,
            config,
            partners,
            delivery,
            inbound,
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            scheduler,
            event_bus: Arc::new(EventBus::default()),
        }
    }
}
