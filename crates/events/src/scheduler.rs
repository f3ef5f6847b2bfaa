//! Deferred task scheduling.
//!
//! [`Scheduler`] runs a task after a delay without blocking the caller.
//! [`TokioScheduler`] uses tokio timers and stops pending tasks on
//! shutdown; [`ManualScheduler`] queues tasks until a test runs them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A boxed task to run once.
pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: ScheduledTask);
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

pub struct TokioScheduler {
    cancel: CancellationToken,
}

impl TokioScheduler {
    /// Tasks still waiting when `cancel` fires are dropped.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Scheduled task dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

/// Queues tasks and runs them only when asked.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, ScheduledTask)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of the queued tasks, in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.lock().iter().map(|(delay, _)| *delay).collect()
    }

    /// Run every queued task in order. Returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let tasks = std::mem::take(&mut *self.lock());
        let count = tasks.len();
        for (_, task) in tasks {
            task.await;
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Duration, ScheduledTask)>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) {
        self.lock().push((delay, task));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
