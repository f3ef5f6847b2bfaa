//! Sandbox test events and their deferred confirmations.
//!
//! A sandbox test dispatches to one partner immediately and may schedule a
//! `<event>.confirmed` follow-up, standing in for an asynchronous provider
//! round-trip.

use std::time::Duration;

use aurum_core::types::EntityId;
use serde_json::Value;

use crate::delivery::DeliveryEngine;
use crate::scheduler::Scheduler;

/// Event type used when a test event names none.
pub const SANDBOX_TEST_EVENT: &str = "sandbox.test";

/// Default delay before a sandbox confirmation is dispatched.
pub const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(2);

pub fn confirmation_event_type(event_type: &str) -> String {
    format!("{event_type}.confirmed")
}

/// Schedule `<event_type>.confirmed` for `partner_id` after `delay`.
pub fn schedule_confirmation(
    engine: &DeliveryEngine,
    scheduler: &dyn Scheduler,
    delay: Duration,
    partner_id: EntityId,
    event_type: &str,
    data: Value,
) {
    let engine = engine.clone();
    let confirmed = confirmation_event_type(event_type);

    scheduler.schedule(
        delay,
        Box::pin(async move {
            match engine.dispatch_to_partner(partner_id, &confirmed, &data).await {
                Ok(handle) => tracing::info!(
                    partner_id = %partner_id,
                    event_type = %confirmed,
                    deliveries = handle.delivery_ids.len(),
                    "Sandbox confirmation dispatched"
                ),
                Err(e) => tracing::warn!(
                    partner_id = %partner_id,
                    event_type = %confirmed,
                    error = %e,
                    "Sandbox confirmation failed"
                ),
            }
        }),
    );
}
