//! Progress tracking for bulk replay jobs.

use std::collections::HashMap;

use aurum_core::types::{EntityId, Timestamp};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;

/// Running counters of one bulk replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayProgress {
    pub job_id: EntityId,
    pub partner_id: EntityId,
    pub total: usize,
    pub done: usize,
    pub delivered: usize,
    pub failed: usize,
    pub finished: bool,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

/// Registry of bulk replay jobs, keyed by job id.
#[derive(Debug, Default)]
pub struct ReplayJobs {
    jobs: RwLock<HashMap<EntityId, ReplayProgress>>,
}

impl ReplayJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, partner_id: EntityId, total: usize) -> ReplayProgress {
        let progress = ReplayProgress {
            job_id: uuid::Uuid::new_v4(),
            partner_id,
            total,
            done: 0,
            delivered: 0,
            failed: 0,
            finished: total == 0,
            started_at: Utc::now(),
            finished_at: (total == 0).then(Utc::now),
        };
        self.jobs
            .write()
            .await
            .insert(progress.job_id, progress.clone());
        progress
    }

    /// Count one replayed delivery.
    pub async fn record(&self, job_id: EntityId, delivered: bool) {
        if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
            job.done += 1;
            if delivered {
                job.delivered += 1;
            } else {
                job.failed += 1;
            }
        }
    }

    pub async fn finish(&self, job_id: EntityId) {
        if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
            job.finished = true;
            job.finished_at = Some(Utc::now());
        }
    }

    /// A job owned by `partner_id`.
    pub async fn get(&self, partner_id: EntityId, job_id: EntityId) -> Option<ReplayProgress> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .filter(|job| job.partner_id == partner_id)
            .cloned()
    }
}
