//! Periodic purge of expired idempotency records.

use std::sync::Arc;
use std::time::Duration;

use aurum_core::idempotency::IdempotencyStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often expired records are purged.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn IdempotencyStore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Idempotency sweep job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Idempotency sweep job stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.purge_expired(Utc::now()).await {
                    Ok(0) => tracing::debug!("Idempotency sweep: nothing expired"),
                    Ok(purged) => tracing::info!(purged, "Idempotency sweep: purged expired records"),
                    Err(e) => tracing::error!(error = %e, "Idempotency sweep failed"),
                }
            }
        }
    }
}
