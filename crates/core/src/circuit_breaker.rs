//! Per-dependency circuit breakers.
//!
//! A breaker wraps calls to one named external dependency and moves
//! between three states:
//!
//! - **closed**: calls run; consecutive failures are counted and any success
//!   resets the count. Reaching `failure_threshold` opens the breaker.
//! - **open**: calls are rejected with [`CircuitError::Open`] without running.
//!   Once `reset_timeout` has elapsed since the last failure, the next call
//!   moves the breaker to half-open before running.
//! - **half-open**: calls run; [`HALF_OPEN_SUCCESS_THRESHOLD`] successes close
//!   the breaker, any failure reopens it.
//!
//! State is in-memory only and resets on restart. Time is measured with
//! `tokio::time::Instant` so tests can drive it with paused time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::types::Timestamp;

/// Successes required in half-open before the breaker closes.
pub const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 3;

/// Default consecutive failures before a breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time an open breaker waits before probing.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The breaker is open; the operation was not attempted.
    #[error("circuit breaker open: {name}")]
    Open { name: String },

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, for observability endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_at: Option<Timestamp>,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

/// Failure-isolation state machine guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_failure_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Reading never transitions the breaker.
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Run `operation` under the breaker.
    ///
    /// Returns [`CircuitError::Open`] without invoking `operation` when the
    /// breaker is open and the reset timeout has not elapsed.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire().await {
            return Err(CircuitError::Open {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Decide whether a call may proceed, moving open to half-open once the
    /// reset timeout has elapsed.
    async fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, probing");
                }
                elapsed
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= HALF_OPEN_SUCCESS_THRESHOLD {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    tracing::info!(breaker = %self.name, "Circuit breaker closed");
                }
            }
            // A call admitted before the breaker opened finished late.
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                tracing::warn!(breaker = %self.name, "Circuit breaker reopened after failed trial request");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock().await;
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_at: inner.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_secs: self.config.reset_timeout.as_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One breaker per dependency name, created on first use.
///
/// Overrides are keyed by [`override_key`], so `webhook:api.example.com`
/// picks up an override registered as `WEBHOOK_API_EXAMPLE_COM`.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

/// Environment-style key of a breaker name: upper-cased, with every
/// non-alphanumeric character replaced by `_`.
pub fn override_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

impl CircuitBreakerRegistry {
    pub fn new(
        defaults: CircuitBreakerConfig,
        overrides: HashMap<String, CircuitBreakerConfig>,
    ) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(name, config)| (override_key(&name), config))
            .collect();

        Self {
            defaults,
            overrides,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the breaker for `name`, creating it if needed.
    pub async fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().await;
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            let config = self
                .overrides
                .get(&override_key(name))
                .cloned()
                .unwrap_or_else(|| self.defaults.clone());
            Arc::new(CircuitBreaker::new(name, config))
        });
        Arc::clone(breaker)
    }

    /// State of an existing breaker, `None` if it was never used.
    pub async fn get_state(&self, name: &str) -> Option<CircuitState> {
        let breaker = self.breakers.read().await.get(name).cloned()?;
        Some(breaker.state().await)
    }

    /// Snapshot of every breaker, sorted by name.
    pub async fn snapshot(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();

        let mut out = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            out.push(breaker.snapshot().await);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), HashMap::new())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "clicksign",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(reset_secs),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicUsize) -> Result<(), CircuitError<&'static str>> {
        cb.call(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("boom")
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker, calls: &AtomicUsize) -> Result<(), CircuitError<&'static str>> {
        cb.call(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), &'static str>(())
        })
        .await
    }

    #[tokio::test]
    async fn new_breaker_is_closed() {
        let cb = breaker(5, 30);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_open_half_open_closed() {
        let cb = breaker(5, 30);
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            assert_matches!(fail(&cb, &calls).await, Err(CircuitError::Inner("boom")));
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // Sixth call is rejected without running the operation.
        assert_matches!(succeed(&cb, &calls).await, Err(CircuitError::Open { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        tokio::time::advance(Duration::from_secs(30)).await;

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(cb.snapshot().await.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_stays_open_before_timeout() {
        let cb = breaker(1, 30);
        let calls = AtomicUsize::new(0);

        let _ = fail(&cb, &calls).await;
        tokio::time::advance(Duration::from_secs(29)).await;

        assert_matches!(succeed(&cb, &calls).await, Err(CircuitError::Open { name }) if name == "clicksign");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_in_half_open_reopens_with_fresh_timer() {
        let cb = breaker(2, 10);
        let calls = AtomicUsize::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let _ = fail(&cb, &calls).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        // The reset timer restarted at the half-open failure.
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_matches!(succeed(&cb, &calls).await, Err(CircuitError::Open { .. }));
        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn success_while_closed_resets_failure_count() {
        let cb = breaker(3, 30);
        let calls = AtomicUsize::new(0);

        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;
        succeed(&cb, &calls).await.unwrap();
        let _ = fail(&cb, &calls).await;
        let _ = fail(&cb, &calls).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.snapshot().await.failure_count, 2);
    }

    #[tokio::test]
    async fn snapshot_reports_configuration_and_last_failure() {
        let cb = breaker(4, 45);
        let calls = AtomicUsize::new(0);
        let _ = fail(&cb, &calls).await;

        let snap = cb.snapshot().await;
        assert_eq!(snap.name, "clicksign");
        assert_eq!(snap.failure_threshold, 4);
        assert_eq!(snap.reset_timeout_secs, 45);
        assert_eq!(snap.failure_count, 1);
        assert!(snap.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn registry_creates_breakers_on_demand_with_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "payments".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_secs(5),
            },
        );
        overrides.insert(
            "WEBHOOK_SLOW_EXAMPLE_COM".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 9,
                reset_timeout: Duration::from_secs(5),
            },
        );
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), overrides);

        assert_eq!(registry.get_state("payments").await, None);
        assert_eq!(registry.get_state("webhook:example.com").await, None);

        let a = registry.get("webhook:example.com").await;
        let b = registry.get("webhook:example.com").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.config().failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(registry.get("payments").await.config().failure_threshold, 2);
        assert_eq!(registry.get_state("payments").await, Some(CircuitState::Closed));
        assert_eq!(
            registry.get("webhook:slow.example.com").await.config().failure_threshold,
            9
        );

        let names: Vec<String> = registry.snapshot().await.into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["payments", "webhook:example.com", "webhook:slow.example.com"]
        );
    }

    #[test]
    fn override_key_is_env_style() {
        assert_eq!(override_key("webhook:api.example.com"), "WEBHOOK_API_EXAMPLE_COM");
        assert_eq!(override_key("clicksign"), "CLICKSIGN");
    }

    #[test]
    fn state_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(CircuitState::HalfOpen).unwrap(), "half-open");
        assert_eq!(serde_json::to_value(CircuitState::Open).unwrap(), "open");
    }
}
