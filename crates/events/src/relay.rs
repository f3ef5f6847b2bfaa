//! Bridges the event bus to the delivery engine.

use tokio::sync::broadcast;

use crate::bus::DomainEvent;
use crate::delivery::DeliveryEngine;

/// Background service dispatching every published domain event.
pub struct OutboundRelay;

impl OutboundRelay {
    /// Run the relay loop until the bus is dropped.
    pub async fn run(engine: DeliveryEngine, mut receiver: broadcast::Receiver<DomainEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => Self::relay(&engine, &event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Outbound relay lagged, some events were not dispatched");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, outbound relay shutting down");
                    break;
                }
            }
        }
    }

    async fn relay(engine: &DeliveryEngine, event: &DomainEvent) {
        let result = match event.partner_id {
            Some(partner_id) => {
                engine
                    .dispatch_to_partner(partner_id, &event.event_type, &event.payload)
                    .await
            }
            None => engine.dispatch(&event.event_type, &event.payload).await,
        };

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                event_type = %event.event_type,
                "Failed to dispatch domain event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use aurum_core::circuit_breaker::CircuitBreakerRegistry;
    use aurum_core::credentials::generate_credentials;
    use aurum_core::delivery::DeliveryLogQuery;
    use aurum_core::partners::{Partner, WebhookEndpoint};
    use chrono::Utc;

    use super::*;
    use crate::bus::EventBus;
    use crate::delivery::{WebhookError, WebhookRequest, WebhookResponse, WebhookTransport};
    use crate::store::{
        InMemoryDeliveryLogRepository, InMemoryPartnerRepository, PartnerRepository,
    };

    struct AlwaysOk;

    #[async_trait]
    impl WebhookTransport for AlwaysOk {
        async fn post(&self, _request: WebhookRequest) -> Result<WebhookResponse, WebhookError> {
            Ok(WebhookResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn published_events_are_dispatched_and_relay_stops_on_close() {
        let partners = Arc::new(InMemoryPartnerRepository::new());
        let engine = DeliveryEngine::new(
            partners.clone(),
            Arc::new(InMemoryDeliveryLogRepository::new()),
            Arc::new(AlwaysOk),
            Arc::new(CircuitBreakerRegistry::new(Default::default(), HashMap::new())),
        );
        let partner = Partner::new("Acme", vec!["*".into()], &generate_credentials(), Utc::now());
        let partner = partners.insert_partner(partner).await.unwrap();
        let endpoint = WebhookEndpoint::new(
            partner.id,
            "https://relay.example.com/h",
            vec!["person.created".into()],
            Utc::now(),
        )
        .unwrap();
        partners.insert_webhook(endpoint).await.unwrap();

        let bus = EventBus::default();
        let relay = tokio::spawn(OutboundRelay::run(engine.clone(), bus.subscribe()));

        bus.publish(DomainEvent::new("person.created"));
        bus.publish(DomainEvent::new("person.deleted"));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .expect("relay should stop when the bus closes")
            .unwrap();

        let page = engine.list_logs(partner.id, &DeliveryLogQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].event_type, "person.created");
    }
}
