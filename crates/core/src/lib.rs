//! Aurum domain core.
//!
//! Pure logic shared by the storage, events and API crates:
//!
//! - [`signing`]: timestamped HMAC-SHA256 signatures for webhooks.
//! - [`circuit_breaker`]: per-dependency failure isolation.
//! - [`idempotency`]: reserved/completed response records and their store.
//! - [`delivery`] and [`partners`]: the outbound delivery model.
//! - [`inbound`], [`contracts`] and [`kpi`]: inbound ingestion and metrics.

pub mod circuit_breaker;
pub mod contracts;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod hashing;
pub mod idempotency;
pub mod inbound;
pub mod kpi;
pub mod pagination;
pub mod partners;
pub mod roles;
pub mod scopes;
pub mod signing;
pub mod types;
