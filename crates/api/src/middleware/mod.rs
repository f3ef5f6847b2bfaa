//! Request middleware and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the caller from a JWT Bearer token.
//! - [`rbac::RequireOperator`] -- Requires the `operator` role.
//! - [`rbac::authorize_partner`] -- Partner ownership and scope checks.
//! - [`idempotency::idempotency_middleware`] -- `Idempotency-Key` replay.

pub mod auth;
pub mod idempotency;
pub mod rbac;
