//! Aurum event delivery and inbound ingestion.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DomainEvent`]: the envelope published on the bus.
//! - [`delivery`]: signed outbound webhook fan-out, replay and bulk replay.
//! - [`OutboundRelay`]: background service dispatching every bus event.
//! - [`InboundLog`]: inbound webhook verification, ring and durable log.
//! - [`Scheduler`]: deferred tasks, used for sandbox confirmations.
//! - [`store`]: partner, endpoint and delivery-log repositories.

pub mod bus;
pub mod delivery;
pub mod inbound;
pub mod relay;
pub mod sandbox;
pub mod scheduler;
pub mod store;

pub use bus::{DomainEvent, EventBus};
pub use delivery::{DeliveryEngine, HttpTransport, WebhookTransport};
pub use inbound::{
    EnvSecrets, InboundConfig, InboundLog, IngestResult, Recorded, SecretSource, StaticSecrets,
};
pub use relay::OutboundRelay;
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use store::{
    DeliveryLogRepository, InMemoryDeliveryLogRepository, InMemoryPartnerRepository,
    PartnerRepository, StoreError,
};
