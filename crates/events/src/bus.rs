//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`DomainEvent`]s. It is
//! shared via `Arc<EventBus>`; the outbound relay is its main subscriber.

use aurum_core::types::{EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// A domain action that partners may be subscribed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `"person.created"`.
    pub event_type: String,

    /// Event data, sent to partners as the envelope's `data`.
    pub payload: serde_json::Value,

    /// Restrict delivery to one partner's endpoints.
    pub partner_id: Option<EntityId>,

    /// Subject of the token that published the event, if any.
    pub actor: Option<String>,

    pub timestamp: Timestamp,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: serde_json::Value::Object(Default::default()),
            partner_id: None,
            actor: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn for_partner(mut self, partner_id: EntityId) -> Self {
        self.partner_id = Some(partner_id);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers will see it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        // A send error only means there are no receivers.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
