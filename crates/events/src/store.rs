//! Repository traits for partners, endpoints and delivery logs, with
//! in-memory implementations.
//!
//! Every mutation happens under a single write lock so callers observe
//! last-write-wins without torn records.

use std::collections::HashMap;

use async_trait::async_trait;
use aurum_core::credentials::RotatedSecrets;
use aurum_core::delivery::{AttemptOutcome, DeliveryLog};
use aurum_core::error::CoreError;
use aurum_core::partners::{Partner, WebhookEndpoint};
use aurum_core::types::{EntityId, Timestamp};
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("storage failure: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            StoreError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PartnerRepository: Send + Sync {
    async fn insert_partner(&self, partner: Partner) -> Result<Partner, StoreError>;

    /// All partners in creation order.
    async fn list_partners(&self) -> Result<Vec<Partner>, StoreError>;

    async fn find_partner(&self, id: EntityId) -> Result<Option<Partner>, StoreError>;

    async fn find_partner_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Partner>, StoreError>;

    async fn rotate_secrets(
        &self,
        id: EntityId,
        secrets: &RotatedSecrets,
    ) -> Result<Partner, StoreError>;

    /// Store an endpoint and attach it to its partner.
    async fn insert_webhook(&self, endpoint: WebhookEndpoint)
        -> Result<WebhookEndpoint, StoreError>;

    /// A partner's endpoints in registration order.
    async fn list_webhooks(&self, partner_id: EntityId)
        -> Result<Vec<WebhookEndpoint>, StoreError>;
}

#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    async fn insert_log(&self, log: DeliveryLog) -> Result<DeliveryLog, StoreError>;

    async fn find_log(&self, id: EntityId) -> Result<Option<DeliveryLog>, StoreError>;

    /// Atomically reserve the next attempt number. Returns the updated log.
    async fn begin_attempt(&self, id: EntityId, now: Timestamp)
        -> Result<DeliveryLog, StoreError>;

    /// Apply an attempt outcome. Returns `false` when the outcome was stale
    /// and discarded.
    async fn record_outcome(
        &self,
        id: EntityId,
        attempt: u32,
        outcome: &AttemptOutcome,
    ) -> Result<bool, StoreError>;

    async fn list_for_partner(&self, partner_id: EntityId)
        -> Result<Vec<DeliveryLog>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory partners
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PartnerTables {
    partners: HashMap<EntityId, Partner>,
    order: Vec<EntityId>,
    webhooks: HashMap<EntityId, WebhookEndpoint>,
}

#[derive(Debug, Default)]
pub struct InMemoryPartnerRepository {
    tables: RwLock<PartnerTables>,
}

impl InMemoryPartnerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn partner_not_found(id: EntityId) -> StoreError {
    StoreError::NotFound {
        entity: "Partner",
        id,
    }
}

#[async_trait]
impl PartnerRepository for InMemoryPartnerRepository {
    async fn insert_partner(&self, partner: Partner) -> Result<Partner, StoreError> {
        let mut tables = self.tables.write().await;
        tables.order.push(partner.id);
        tables.partners.insert(partner.id, partner.clone());
        Ok(partner)
    }

    async fn list_partners(&self) -> Result<Vec<Partner>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .order
            .iter()
            .filter_map(|id| tables.partners.get(id).cloned())
            .collect())
    }

    async fn find_partner(&self, id: EntityId) -> Result<Option<Partner>, StoreError> {
        Ok(self.tables.read().await.partners.get(&id).cloned())
    }

    async fn find_partner_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Partner>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .partners
            .values()
            .find(|p| p.client_id == client_id)
            .cloned())
    }

    async fn rotate_secrets(
        &self,
        id: EntityId,
        secrets: &RotatedSecrets,
    ) -> Result<Partner, StoreError> {
        let mut tables = self.tables.write().await;
        let partner = tables.partners.get_mut(&id).ok_or_else(|| partner_not_found(id))?;
        partner.rotate(secrets);
        Ok(partner.clone())
    }

    async fn insert_webhook(
        &self,
        endpoint: WebhookEndpoint,
    ) -> Result<WebhookEndpoint, StoreError> {
        let mut tables = self.tables.write().await;
        let partner = tables
            .partners
            .get_mut(&endpoint.partner_id)
            .ok_or_else(|| partner_not_found(endpoint.partner_id))?;
        partner.webhook_ids.push(endpoint.id);
        tables.webhooks.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn list_webhooks(
        &self,
        partner_id: EntityId,
    ) -> Result<Vec<WebhookEndpoint>, StoreError> {
        let tables = self.tables.read().await;
        let partner = tables
            .partners
            .get(&partner_id)
            .ok_or_else(|| partner_not_found(partner_id))?;
        Ok(partner
            .webhook_ids
            .iter()
            .filter_map(|id| tables.webhooks.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory delivery logs
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryDeliveryLogRepository {
    logs: RwLock<HashMap<EntityId, DeliveryLog>>,
}

impl InMemoryDeliveryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn log_not_found(id: EntityId) -> StoreError {
    StoreError::NotFound {
        entity: "DeliveryLog",
        id,
    }
}

#[async_trait]
impl DeliveryLogRepository for InMemoryDeliveryLogRepository {
    async fn insert_log(&self, log: DeliveryLog) -> Result<DeliveryLog, StoreError> {
        self.logs.write().await.insert(log.id, log.clone());
        Ok(log)
    }

    async fn find_log(&self, id: EntityId) -> Result<Option<DeliveryLog>, StoreError> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn begin_attempt(
        &self,
        id: EntityId,
        now: Timestamp,
    ) -> Result<DeliveryLog, StoreError> {
        let mut logs = self.logs.write().await;
        let log = logs.get_mut(&id).ok_or_else(|| log_not_found(id))?;
        log.begin_attempt(now);
        Ok(log.clone())
    }

    async fn record_outcome(
        &self,
        id: EntityId,
        attempt: u32,
        outcome: &AttemptOutcome,
    ) -> Result<bool, StoreError> {
        let mut logs = self.logs.write().await;
        let log = logs.get_mut(&id).ok_or_else(|| log_not_found(id))?;
        Ok(log.apply_outcome(attempt, outcome))
    }

    async fn list_for_partner(
        &self,
        partner_id: EntityId,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        Ok(self
            .logs
            .read()
            .await
            .values()
            .filter(|log| log.partner_id == partner_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
