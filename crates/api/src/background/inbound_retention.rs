//! Periodic pruning of expired inbound webhook events.
//!
//! Expired entries are dropped from the in-memory ring and, when a
//! database is configured, from durable storage.

use std::sync::Arc;
use std::time::Duration;

use aurum_events::InboundLog;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the retention job runs.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the retention loop until `cancel` is triggered.
pub async fn run(inbound: Arc<InboundLog>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        durable = inbound.has_database(),
        "Inbound retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Inbound retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                let (ring, rows) = inbound.prune(Utc::now()).await;
                if ring > 0 || rows > 0 {
                    tracing::info!(ring, rows, "Inbound retention: pruned expired events");
                } else {
                    tracing::debug!("Inbound retention: nothing to prune");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use aurum_events::{InboundConfig, StaticSecrets};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn prunes_on_each_tick_and_stops_on_cancel() {
        let inbound = Arc::new(InboundLog::new(
            None,
            Arc::new(StaticSecrets::new()),
            InboundConfig {
                retention: chrono::Duration::zero(),
                ..Default::default()
            },
        ));
        inbound
            .ingest("acme", &[], br#"{"id":"evt-1"}"#, Utc::now())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&inbound),
            Duration::from_secs(60),
            cancel.clone(),
        ));

        // The first tick fires immediately and leaves nothing to prune.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(inbound.prune(Utc::now()).await, (0, 0));

        cancel.cancel();
        task.await.unwrap();
    }
}
