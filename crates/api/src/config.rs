use std::collections::HashMap;
use std::time::Duration;

use aurum_core::circuit_breaker::CircuitBreakerConfig;

use crate::auth::jwt::JwtConfig;

const BREAKER_PREFIX: &str = "AURUM_BREAKER_";
const THRESHOLD_SUFFIX: &str = "_FAILURE_THRESHOLD";
const RESET_SUFFIX: &str = "_RESET_TIMEOUT_SECS";

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown drain timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Enables durable inbound storage when set.
    pub database_url: Option<String>,
    /// Per-attempt outbound delivery timeout (default: `8`).
    pub delivery_timeout_secs: u64,
    /// Idempotency record lifetime (default: `24`).
    pub idempotency_ttl_hours: i64,
    /// Inbound event log retention (default: `30`).
    pub inbound_retention_days: i64,
    /// Bound of the in-memory inbound ring (default: `1000`).
    pub inbound_ring_capacity: usize,
    /// Signature verification window (default: `300`).
    pub signature_tolerance_secs: u64,
    /// Delay before a sandbox confirmation is dispatched (default: `2`).
    pub sandbox_confirmation_delay_secs: u64,
    /// Default circuit breaker thresholds.
    pub breaker_defaults: CircuitBreakerConfig,
    /// Per-dependency breaker overrides, keyed by env-style name.
    pub breaker_overrides: HashMap<String, CircuitBreakerConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default                 |
    /// |--------------------------------------|-------------------------|
    /// | `HOST`                               | `0.0.0.0`               |
    /// | `PORT`                               | `3000`                  |
    /// | `CORS_ORIGINS`                       | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`               | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`              | `30`                    |
    /// | `DATABASE_URL`                       | unset (in-memory only)  |
    /// | `DELIVERY_TIMEOUT_SECS`              | `8`                     |
    /// | `IDEMPOTENCY_TTL_HOURS`              | `24`                    |
    /// | `INBOUND_RETENTION_DAYS`             | `30`                    |
    /// | `INBOUND_RING_CAPACITY`              | `1000`                  |
    /// | `SIGNATURE_TOLERANCE_SECS`           | `300`                   |
    /// | `SANDBOX_CONFIRMATION_DELAY_SECS`    | `2`                     |
    /// | `AURUM_BREAKER_FAILURE_THRESHOLD`    | `5`                     |
    /// | `AURUM_BREAKER_RESET_TIMEOUT_SECS`   | `30`                    |
    ///
    /// Per-dependency breaker overrides use
    /// `AURUM_BREAKER_<NAME>_FAILURE_THRESHOLD` and
    /// `AURUM_BREAKER_<NAME>_RESET_TIMEOUT_SECS`.
    ///
    /// # Panics
    ///
    /// Panics on unparsable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let breaker_defaults = CircuitBreakerConfig {
            failure_threshold: env_or("AURUM_BREAKER_FAILURE_THRESHOLD", 5),
            reset_timeout: Duration::from_secs(env_or("AURUM_BREAKER_RESET_TIMEOUT_SECS", 30)),
        };
        let breaker_overrides = parse_breaker_overrides(std::env::vars(), &breaker_defaults);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            jwt: JwtConfig::from_env(),
            database_url,
            delivery_timeout_secs: env_or("DELIVERY_TIMEOUT_SECS", 8),
            idempotency_ttl_hours: env_or("IDEMPOTENCY_TTL_HOURS", 24),
            inbound_retention_days: env_or("INBOUND_RETENTION_DAYS", 30),
            inbound_ring_capacity: env_or("INBOUND_RING_CAPACITY", 1000),
            signature_tolerance_secs: env_or("SIGNATURE_TOLERANCE_SECS", 300),
            sandbox_confirmation_delay_secs: env_or("SANDBOX_CONFIRMATION_DELAY_SECS", 2),
            breaker_defaults,
            breaker_overrides,
        }
    }
}

/// Read and parse `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

/// Collect `AURUM_BREAKER_<NAME>_*` overrides from environment pairs.
///
/// A name with only one of the two settings inherits the other from
/// `defaults`.
pub fn parse_breaker_overrides<I>(
    vars: I,
    defaults: &CircuitBreakerConfig,
) -> HashMap<String, CircuitBreakerConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides: HashMap<String, CircuitBreakerConfig> = HashMap::new();

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(BREAKER_PREFIX) else {
            continue;
        };

        if let Some(name) = rest.strip_suffix(THRESHOLD_SUFFIX).filter(|n| !n.is_empty()) {
            let threshold: u32 = value
                .parse()
                .unwrap_or_else(|e| panic!("{key} must be a valid u32: {e}"));
            overrides
                .entry(name.to_string())
                .or_insert_with(|| defaults.clone())
                .failure_threshold = threshold;
        } else if let Some(name) = rest.strip_suffix(RESET_SUFFIX).filter(|n| !n.is_empty()) {
            let secs: u64 = value
                .parse()
                .unwrap_or_else(|e| panic!("{key} must be a valid u64: {e}"));
            overrides
                .entry(name.to_string())
                .or_insert_with(|| defaults.clone())
                .reset_timeout = Duration::from_secs(secs);
        }
    }

    overrides
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn breaker_overrides_are_grouped_by_name() {
        let defaults = CircuitBreakerConfig::default();
        let overrides = parse_breaker_overrides(
            pairs(&[
                ("AURUM_BREAKER_FAILURE_THRESHOLD", "7"),
                ("AURUM_BREAKER_CLICKSIGN_FAILURE_THRESHOLD", "2"),
                ("AURUM_BREAKER_WEBHOOK_API_EXAMPLE_COM_RESET_TIMEOUT_SECS", "90"),
                ("UNRELATED", "1"),
            ]),
            &defaults,
        );

        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides["CLICKSIGN"].failure_threshold, 2);
        assert_eq!(overrides["CLICKSIGN"].reset_timeout, defaults.reset_timeout);

        let webhook = &overrides["WEBHOOK_API_EXAMPLE_COM"];
        assert_eq!(webhook.failure_threshold, defaults.failure_threshold);
        assert_eq!(webhook.reset_timeout, Duration::from_secs(90));
    }
}
