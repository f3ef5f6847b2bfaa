//! Windowed KPI aggregation over inbound webhook events.
//!
//! `success_rate` mirrors `verification_rate`: inbound events carry no
//! downstream outcome, so verification is the only success signal available.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::Serialize;

use crate::error::CoreError;
use crate::inbound::InboundEventLog;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A relative time range over which counters are aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KpiWindow {
    FiveMinutes,
    OneHour,
    #[default]
    OneDay,
    All,
}

impl KpiWindow {
    pub const ALL_WINDOWS: [KpiWindow; 4] =
        [Self::FiveMinutes, Self::OneHour, Self::OneDay, Self::All];

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "5m" => Ok(Self::FiveMinutes),
            "1h" => Ok(Self::OneHour),
            "24h" => Ok(Self::OneDay),
            "all" => Ok(Self::All),
            other => Err(CoreError::Validation(format!(
                "invalid window '{other}', expected one of 5m, 1h, 24h, all"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
            Self::OneDay => "24h",
            Self::All => "all",
        }
    }

    /// Window length in minutes; `None` for the unbounded window.
    pub fn minutes(&self) -> Option<i64> {
        match self {
            Self::FiveMinutes => Some(5),
            Self::OneHour => Some(60),
            Self::OneDay => Some(24 * 60),
            Self::All => None,
        }
    }

    /// Whether `received_at` falls inside this window ending at `now`.
    pub fn contains(&self, received_at: Timestamp, now: Timestamp) -> bool {
        match self.minutes() {
            Some(m) => received_at >= now - Duration::minutes(m) && received_at <= now,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// The fields of one logged inbound event that KPI aggregation reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiSample {
    pub provider: String,
    pub verified: bool,
    pub received_at: Timestamp,
    pub expires_at: Timestamp,
}

impl KpiSample {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

impl From<&InboundEventLog> for KpiSample {
    fn from(event: &InboundEventLog) -> Self {
        Self {
            provider: event.provider.clone(),
            verified: event.verified,
            received_at: event.received_at,
            expires_at: event.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Counters for one provider, or for all providers combined.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub total: u64,
    pub verified: u64,
    pub unverified: u64,
    pub verification_rate: f64,
    pub success_rate: f64,
}

impl ProviderStats {
    fn record(&mut self, verified: bool) {
        self.total += 1;
        if verified {
            self.verified += 1;
        } else {
            self.unverified += 1;
        }
    }

    fn finish(mut self) -> Self {
        self.verification_rate = if self.total == 0 {
            0.0
        } else {
            self.verified as f64 / self.total as f64
        };
        self.success_rate = self.verification_rate;
        self
    }
}

/// Per-provider and overall counters for a single window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub window: &'static str,
    pub provider: Option<String>,
    pub providers: BTreeMap<String, ProviderStats>,
    pub overall: ProviderStats,
    pub generated_at: Timestamp,
}

/// One window of the multi-window KPI snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowKpi {
    pub providers: BTreeMap<String, ProviderStats>,
    pub overall: ProviderStats,
    pub requests_per_minute: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub provider_count: usize,
    pub total_webhooks: u64,
    pub total_verified: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub provider: Option<String>,
    pub windows: BTreeMap<&'static str, WindowKpi>,
    pub summary: KpiSummary,
    pub generated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn aggregate<'a>(
    events: impl IntoIterator<Item = &'a KpiSample>,
    provider: Option<&str>,
    window: KpiWindow,
    now: Timestamp,
) -> (BTreeMap<String, ProviderStats>, ProviderStats) {
    let mut providers: BTreeMap<String, ProviderStats> = BTreeMap::new();
    let mut overall = ProviderStats::default();

    for event in events {
        if event.is_expired(now) || !window.contains(event.received_at, now) {
            continue;
        }
        if provider.is_some_and(|p| p != event.provider) {
            continue;
        }
        providers
            .entry(event.provider.clone())
            .or_default()
            .record(event.verified);
        overall.record(event.verified);
    }

    let providers = providers
        .into_iter()
        .map(|(name, stats)| (name, stats.finish()))
        .collect();
    (providers, overall.finish())
}

/// Aggregate events in one window, optionally restricted to one provider.
pub fn compute_stats(
    events: &[KpiSample],
    provider: Option<&str>,
    window: KpiWindow,
    now: Timestamp,
) -> StatsSnapshot {
    let (providers, overall) = aggregate(events, provider, window, now);
    StatsSnapshot {
        window: window.as_str(),
        provider: provider.map(str::to_string),
        providers,
        overall,
        generated_at: now,
    }
}

/// Aggregate every window plus a cross-window summary.
///
/// For the unbounded window `requestsPerMinute` divides by the minutes
/// elapsed since the oldest counted event, with a floor of one minute.
pub fn compute_kpis(
    events: &[KpiSample],
    provider: Option<&str>,
    now: Timestamp,
) -> KpiSnapshot {
    let mut windows = BTreeMap::new();

    for window in KpiWindow::ALL_WINDOWS {
        let (providers, overall) = aggregate(events, provider, window, now);
        let minutes = window.minutes().unwrap_or_else(|| {
            events
                .iter()
                .filter(|e| !e.is_expired(now) && provider.map_or(true, |p| p == e.provider))
                .map(|e| e.received_at)
                .min()
                .map(|oldest| (now - oldest).num_minutes())
                .unwrap_or(0)
        });
        let requests_per_minute = overall.total as f64 / minutes.max(1) as f64;

        windows.insert(
            window.as_str(),
            WindowKpi {
                providers,
                overall,
                requests_per_minute,
            },
        );
    }

    let summary = windows
        .get(KpiWindow::All.as_str())
        .map(|all| KpiSummary {
            provider_count: all.providers.len(),
            total_webhooks: all.overall.total,
            total_verified: all.overall.verified,
        })
        .unwrap_or(KpiSummary {
            provider_count: 0,
            total_webhooks: 0,
            total_verified: 0,
        });

    KpiSnapshot {
        provider: provider.map(str::to_string),
        windows,
        summary,
        generated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
